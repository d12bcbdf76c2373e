// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    event::HeartbeatUpdated,
    heartbeat::Heartbeat,
    message::Message,
    Error,
};

use vespa_common::event::Bus;

use std::sync::{Arc, Mutex};

/// The protocol feature set this node requires from its peers.
pub const FEATURE_SET: u8 = 0b0000_0001;

/// A connected peer, identified by an opaque id assigned by the transport.
pub struct Peer {
    id: String,
    feature_set: u8,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl Peer {
    /// Accepts a peer after the handshake. A peer without the required
    /// feature set is rejected and has to be dropped by the caller.
    pub fn new(id: impl Into<String>, feature_set: u8) -> Result<Self, Error> {
        let id = id.into();

        if feature_set & FEATURE_SET == 0 {
            return Err(Error::ProtocolMismatch(id, FEATURE_SET));
        }

        Ok(Self {
            id,
            feature_set,
            heartbeat: Mutex::new(None),
        })
    }

    /// The transport-assigned id of the peer.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the peer supports the given feature set.
    pub fn supports(&self, feature_set: u8) -> bool {
        self.feature_set & feature_set != 0
    }

    /// The latest heartbeat received from the peer, if any.
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        self.heartbeat.lock().unwrap().clone()
    }

    /// Parses an incoming heartbeat payload, stores it and dispatches
    /// `HeartbeatUpdated`.
    pub fn handle_heartbeat(self: &Arc<Self>, bus: &Bus<'static>, bytes: &[u8]) -> Result<(), Error> {
        let heartbeat = Heartbeat::from_bytes(bytes)?;

        *self.heartbeat.lock().unwrap() = Some(heartbeat.clone());

        bus.dispatch(HeartbeatUpdated {
            peer_id: self.id.clone(),
            heartbeat,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_set_mismatch_is_rejected() {
        assert!(Peer::new("peer", 0).is_err());
        assert!(Peer::new("peer", FEATURE_SET).is_ok());
    }

    #[test]
    fn heartbeat_is_stored_and_dispatched() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let bus: &'static Bus<'static> = Box::leak(Box::new(Bus::default()));
        let peer = Arc::new(Peer::new("peer", FEATURE_SET).unwrap());

        static SEEN: AtomicU32 = AtomicU32::new(0);
        bus.add_static_listener(|event: &HeartbeatUpdated| {
            SEEN.store(event.heartbeat.solid_milestone_index, Ordering::SeqCst);
        });

        let bytes = Heartbeat::new(7, 1, 9, 2, 1).into_bytes_new();
        peer.handle_heartbeat(bus, &bytes).unwrap();

        assert_eq!(peer.heartbeat().unwrap().solid_milestone_index, 7);
        assert_eq!(SEEN.load(Ordering::SeqCst), 7);
    }
}
