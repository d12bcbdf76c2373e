// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The milestone coordinator: a ticker-driven producer that selects tips
//! with a heaviest-branch selector, emits checkpoint bundles between
//! milestones and issues signed milestone bundles.

pub mod event;
pub mod mselection;
pub mod worker;

mod config;
mod coordinator;
mod error;
mod signer;
mod state;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder, TipSelConfig, TipSelConfigBuilder};
pub use coordinator::{Coordinator, SendBundle};
pub use error::Error;
pub use signer::{KeyedSigner, MilestoneSigner};
pub use state::State;
