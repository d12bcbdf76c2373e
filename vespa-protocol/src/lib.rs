// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Peer-facing protocol pieces of the node: the heartbeat message, peers,
//! the request queue and the warp-sync controller.

pub mod event;

mod heartbeat;
mod message;
mod peer;
mod rqueue;
mod warpsync;

pub use heartbeat::Heartbeat;
pub use message::{Error as MessageError, Message};
pub use peer::{Peer, FEATURE_SET};
pub use rqueue::{Request, RequestQueue};
pub use warpsync::{WarpSync, WarpSyncConfig, WarpSyncConfigBuilder, WarpSyncWorker};

use thiserror::Error;

/// Errors occurring in the peer protocol.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The peer does not support the required protocol feature set; it has
    /// to be dropped.
    #[error("Peer {0} does not support feature set {1:#04x}.")]
    ProtocolMismatch(String, u8),
    /// A message could not be parsed.
    #[error("Message error: {0}")]
    Message(#[from] message::Error),
}
