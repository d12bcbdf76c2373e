// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::message::Message;

use std::ops::Range;

/// Fixed payload length: three big-endian `u32` indexes followed by two peer
/// counters.
const HEARTBEAT_LENGTH: usize = 3 * 4 + 2;

/// Byte offsets of the heartbeat fields.
const SOLID_MILESTONE_INDEX_OFFSET: usize = 0;
const PRUNING_INDEX_OFFSET: usize = 4;
const LATEST_MILESTONE_INDEX_OFFSET: usize = 8;
const CONNECTED_PEERS_OFFSET: usize = 12;
const SYNCED_PEERS_OFFSET: usize = 13;

// The payload length was validated before parsing, so the slice is in range.
fn field_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&bytes[offset..offset + 4]);

    u32::from_be_bytes(field)
}

/// Describes which part of the tangle a peer currently stores: its solid and
/// latest milestone, its pruning horizon and how well it is connected. Peers
/// send one after connecting, after pruning and after solidifying a new
/// milestone; warp-sync uses it to pick its catch-up target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Index of the latest solid milestone of the peer.
    pub solid_milestone_index: u32,
    /// Pruning index of the peer.
    pub pruning_index: u32,
    /// Index of the latest known milestone of the peer.
    pub latest_milestone_index: u32,
    /// Number of connected peers of the peer.
    pub connected_peers: u8,
    /// Number of synced peers of the peer.
    pub synced_peers: u8,
}

impl Heartbeat {
    /// Creates a new heartbeat.
    pub fn new(
        solid_milestone_index: u32,
        pruning_index: u32,
        latest_milestone_index: u32,
        connected_peers: u8,
        synced_peers: u8,
    ) -> Self {
        Self {
            solid_milestone_index,
            pruning_index,
            latest_milestone_index,
            connected_peers,
            synced_peers,
        }
    }
}

impl Message for Heartbeat {
    const ID: u8 = 0x01;

    fn size_range() -> Range<usize> {
        HEARTBEAT_LENGTH..HEARTBEAT_LENGTH + 1
    }

    fn from_bytes_unchecked(bytes: &[u8]) -> Self {
        Self {
            solid_milestone_index: field_u32(bytes, SOLID_MILESTONE_INDEX_OFFSET),
            pruning_index: field_u32(bytes, PRUNING_INDEX_OFFSET),
            latest_milestone_index: field_u32(bytes, LATEST_MILESTONE_INDEX_OFFSET),
            connected_peers: bytes[CONNECTED_PEERS_OFFSET],
            synced_peers: bytes[SYNCED_PEERS_OFFSET],
        }
    }

    fn size(&self) -> usize {
        HEARTBEAT_LENGTH
    }

    fn into_bytes(self, bytes: &mut [u8]) {
        bytes[SOLID_MILESTONE_INDEX_OFFSET..PRUNING_INDEX_OFFSET]
            .copy_from_slice(&self.solid_milestone_index.to_be_bytes());
        bytes[PRUNING_INDEX_OFFSET..LATEST_MILESTONE_INDEX_OFFSET].copy_from_slice(&self.pruning_index.to_be_bytes());
        bytes[LATEST_MILESTONE_INDEX_OFFSET..CONNECTED_PEERS_OFFSET]
            .copy_from_slice(&self.latest_milestone_index.to_be_bytes());
        bytes[CONNECTED_PEERS_OFFSET] = self.connected_peers;
        bytes[SYNCED_PEERS_OFFSET] = self.synced_peers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_big_endian_with_fourteen_bytes() {
        let bytes = Heartbeat::new(0x0102_0304, 0x0506_0708, 0x090a_0b0c, 0x0d, 0x0e).into_bytes_new();

        assert_eq!(bytes, (1u8..=14).collect::<Vec<u8>>());
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let heartbeat = Heartbeat::new(4_128_563, 96_004, 4_128_570, 8, 3);

        let parsed = Heartbeat::from_bytes(&heartbeat.clone().into_bytes_new()).unwrap();

        assert_eq!(parsed, heartbeat);
    }

    #[test]
    fn truncated_and_padded_payloads_are_rejected() {
        assert!(Heartbeat::from_bytes(&[0u8; HEARTBEAT_LENGTH - 1]).is_err());
        assert!(Heartbeat::from_bytes(&[0u8; HEARTBEAT_LENGTH]).is_ok());
        assert!(Heartbeat::from_bytes(&[0u8; HEARTBEAT_LENGTH + 1]).is_err());
    }

    #[test]
    fn extreme_indexes_survive_the_codec() {
        let heartbeat = Heartbeat::new(u32::MAX, 0, u32::MAX - 1, u8::MAX, 0);

        let parsed = Heartbeat::from_bytes(&heartbeat.clone().into_bytes_new()).unwrap();

        assert_eq!(parsed.solid_milestone_index, u32::MAX);
        assert_eq!(parsed.pruning_index, 0);
        assert_eq!(parsed.latest_milestone_index, u32::MAX - 1);
        assert_eq!(parsed.connected_peers, u8::MAX);
        assert_eq!(parsed.synced_peers, 0);
    }
}
