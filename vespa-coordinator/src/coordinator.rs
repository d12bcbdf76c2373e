// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::CoordinatorConfig,
    error::Error,
    event::{IssuedCheckpointTransaction, IssuedMilestone},
    signer::MilestoneSigner,
    state::State,
};

use vespa_bundle::{Hash, MilestoneIndex, Transaction};
use vespa_common::event::Bus;
use vespa_tangle::Tangle;

use log::info;

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Emits a bundle through gossip, blocking until every transaction of the
/// bundle was processed by the storage layer (and, for milestones, until the
/// solid milestone index changed). This back-pressure keeps the issuer from
/// outrunning storage.
pub type SendBundle =
    Box<dyn Fn(&[Transaction], bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// The milestone coordinator.
///
/// Issues checkpoint bundles between milestones and signed milestone bundles
/// on a fixed interval, persisting its state after every milestone.
pub struct Coordinator {
    config: CoordinatorConfig,
    signer: Box<dyn MilestoneSigner>,
    send_bundle: SendBundle,
    bus: Arc<Bus<'static>>,
    state: Mutex<Option<State>>,
}

impl Coordinator {
    /// Creates a coordinator. Refuses to operate on a tainted database.
    pub fn new(
        tangle: &Tangle,
        config: CoordinatorConfig,
        signer: Box<dyn MilestoneSigner>,
        send_bundle: SendBundle,
        bus: Arc<Bus<'static>>,
    ) -> Result<Self, Error> {
        if tangle.is_database_tainted() {
            return Err(Error::DatabaseTainted);
        }

        Ok(Self {
            config,
            signer,
            send_bundle,
            bus,
            state: Mutex::new(None),
        })
    }

    /// The milestone interval.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// The coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The address milestones are issued from.
    pub fn address(&self) -> Hash {
        self.signer.address()
    }

    /// The last issued milestone, once bootstrapped.
    pub fn state(&self) -> Option<State> {
        self.state.lock().unwrap().clone()
    }

    /// Loads the persisted state, or mints the genesis milestone when
    /// bootstrapping was requested and no state exists yet. Returns the tail
    /// of the last milestone. Errors here are critical.
    pub fn bootstrap(&self, tangle: &Tangle) -> Result<Hash, Error> {
        match State::from_file(&self.config.state_file_path).map_err(Error::State)? {
            Some(state) => {
                info!(
                    "Coordinator resumed at milestone {}.",
                    state.latest_milestone_index
                );

                tangle.update_latest_milestone_index(state.latest_milestone_index);
                let hash = state.latest_milestone_hash;
                *self.state.lock().unwrap() = Some(state);

                Ok(hash)
            }
            None if self.config.bootstrap => {
                info!("Bootstrapping the network at milestone {}.", self.config.start_index);

                self.create_and_send_milestone(self.config.start_index, Hash::NULL, Hash::NULL)
            }
            None => Err(Error::StateNotFound),
        }
    }

    /// Issues a checkpoint bundle: one zero-value transaction per tip,
    /// chained onto the previous checkpoint via trunk references. Returns
    /// the hash of the last transaction, the new checkpoint.
    pub fn issue_checkpoint(
        &self,
        tangle: &Tangle,
        checkpoint_index: usize,
        last_checkpoint_hash: Hash,
        tips: Vec<Hash>,
    ) -> Result<Hash, Error> {
        if tips.is_empty() {
            return Err(Error::NoTipsAvailable);
        }

        let timestamp = unix_timestamp();
        let mut transactions = Vec::with_capacity(tips.len());
        let mut last = last_checkpoint_hash;

        for tip in &tips {
            let mut essence = last.as_bytes().to_vec();
            essence.extend_from_slice(tip.as_bytes());
            essence.extend_from_slice(&(checkpoint_index as u64).to_be_bytes());

            let transaction = Transaction::new(
                last,
                *tip,
                Hash::digest(&essence),
                Hash::NULL,
                0,
                0,
                0,
                0,
                timestamp,
            )?;

            last = transaction.hash();
            transactions.push(transaction);
        }

        (self.send_bundle)(&transactions, false).map_err(|e| Error::SendFailed(e.to_string()))?;

        let tips_total = transactions.len();
        for (tip_index, transaction) in transactions.iter().enumerate() {
            self.bus.dispatch(IssuedCheckpointTransaction {
                checkpoint_index,
                tip_index,
                tips_total,
                hash: transaction.hash(),
            });
        }

        Ok(last)
    }

    /// Issues the next milestone on top of the last milestone and the last
    /// checkpoint. Fails with `NodeNotSynced` while the node lags behind;
    /// state persistence failures are critical.
    pub fn issue_milestone(
        &self,
        tangle: &Tangle,
        last_milestone_hash: Hash,
        last_checkpoint_hash: Hash,
    ) -> Result<Hash, Error> {
        if !tangle.is_synced() {
            return Err(Error::NodeNotSynced);
        }

        let index = match &*self.state.lock().unwrap() {
            Some(state) => state.latest_milestone_index + 1,
            None => return Err(Error::StateNotFound),
        };

        self.create_and_send_milestone(index, last_milestone_hash, last_checkpoint_hash)
    }

    /// Builds, signs, sends and persists a milestone bundle; returns its
    /// tail transaction hash.
    fn create_and_send_milestone(&self, index: MilestoneIndex, trunk: Hash, branch: Hash) -> Result<Hash, Error> {
        let last_index = u64::from(self.config.security_level);

        let mut essence = index.0.to_be_bytes().to_vec();
        essence.extend_from_slice(trunk.as_bytes());
        essence.extend_from_slice(branch.as_bytes());

        let signature = self.signer.sign(index, &essence).map_err(Error::Signer)?;
        let bundle_hash = Hash::digest(&signature);

        let address = self.signer.address();
        let timestamp = unix_timestamp();

        // Built head first: every transaction trunk-references its successor
        // in the bundle, and the non-head ones branch-reference the head's
        // trunk.
        let mut transactions = Vec::with_capacity(last_index as usize + 1);
        let mut next_hash = trunk;

        for i in (0..=last_index).rev() {
            let (tx_trunk, tx_branch) = if i == last_index {
                (trunk, branch)
            } else {
                (next_hash, trunk)
            };

            let transaction = Transaction::new(
                tx_trunk,
                tx_branch,
                bundle_hash,
                address,
                0,
                i,
                last_index,
                u64::from(index.0),
                timestamp,
            )?;

            next_hash = transaction.hash();
            transactions.push(transaction);
        }

        transactions.reverse();
        let tail = transactions[0].hash();

        (self.send_bundle)(&transactions, true).map_err(|e| Error::SendFailed(e.to_string()))?;

        let state = State {
            latest_milestone_index: index,
            latest_milestone_hash: tail,
        };
        state.to_file(&self.config.state_file_path).map_err(Error::State)?;
        *self.state.lock().unwrap() = Some(state);

        self.bus.dispatch(IssuedMilestone { index, tail });

        Ok(tail)
    }
}

fn unix_timestamp() -> u64 {
    // Safe to unwrap: the system clock is past the epoch.
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}
