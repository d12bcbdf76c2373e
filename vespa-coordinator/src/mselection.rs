// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The heaviest-branch tip selector.
//!
//! Tracks recently solidified tail transactions together with an approver
//! count: every new solid bundle increments the count of each tracked
//! ancestor in its past cone. Selection draws tips weighted by that count,
//! under a deadline, and untracks the picked tips and their ancestors.

use crate::{config::TipSelConfig, error::Error};

use vespa_bundle::Hash;
use vespa_tangle::{traversal, Tangle};

use rand::Rng;

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Instant,
};

/// The heaviest-branch tip selector.
pub struct HeaviestSelector {
    config: TipSelConfig,
    tracked: Mutex<HashMap<Hash, u64>>,
}

impl HeaviestSelector {
    /// Creates a selector.
    pub fn new(config: TipSelConfig) -> Self {
        Self {
            config,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Number of currently tracked tails.
    pub fn tracked_tails_count(&self) -> usize {
        self.tracked.lock().unwrap().len()
    }

    /// Feeds a new solid bundle tail into the selector: the approver count
    /// of every tracked ancestor in its unconfirmed past cone is incremented
    /// and the tail itself becomes tracked. Returns the tracked count.
    pub fn on_new_solid_bundle(&self, tangle: &Tangle, tail: Hash) -> usize {
        let mut tracked = self.tracked.lock().unwrap();

        if tracked.contains_key(&tail) {
            return tracked.len();
        }

        // The callbacks are infallible and no abort channel is passed.
        let _ = traversal::traverse_approvees(
            tangle,
            tail,
            |cached_metadata| Ok(!cached_metadata.is_confirmed()),
            |cached_metadata| {
                if cached_metadata.hash() != &tail {
                    if let Some(count) = tracked.get_mut(cached_metadata.hash()) {
                        *count += 1;
                    }
                }
                Ok(())
            },
            |_| Ok(()),
            |_| {},
            false,
            false,
            false,
            None,
        );

        tracked.insert(tail, 0);
        tracked.len()
    }

    /// Selects tips for a checkpoint: up to the configured number of
    /// weighted tips plus `extra_tips`, plus the configured number of
    /// uniformly sampled ones. Fails with `NoTipsAvailable` when fewer than
    /// the minimum threshold of tails is tracked or nothing was selected
    /// before the deadline. Selected tips and their tracked ancestors are
    /// removed from tracking.
    pub fn select_tips(&self, tangle: &Tangle, extra_tips: usize) -> Result<Vec<Hash>, Error> {
        let deadline = Instant::now() + self.config.heaviest_branch_selection_deadline;
        let mut tracked = self.tracked.lock().unwrap();

        if tracked.len() < self.config.min_heaviest_branch_unconfirmed_transactions_threshold {
            return Err(Error::NoTipsAvailable);
        }

        let mut pool: Vec<(Hash, u64)> = tracked.iter().map(|(hash, count)| (*hash, *count + 1)).collect();
        let mut rng = rand::thread_rng();
        let mut selected = Vec::new();

        let target = self.config.max_heaviest_branch_tips_per_checkpoint + extra_tips;

        // Weighted picks; the deadline bounds the pass and a partial result
        // is returned.
        while selected.len() < target && !pool.is_empty() && Instant::now() < deadline {
            let total: u64 = pool.iter().map(|(_, weight)| *weight).sum();
            let mut roll = rng.gen_range(0..total);

            let mut picked = pool.len() - 1;
            for (i, (_, weight)) in pool.iter().enumerate() {
                if roll < *weight {
                    picked = i;
                    break;
                }
                roll -= *weight;
            }

            selected.push(pool.swap_remove(picked).0);
        }

        // Uniform picks.
        for _ in 0..self.config.random_tips_per_checkpoint {
            if pool.is_empty() || Instant::now() >= deadline {
                break;
            }

            let picked = rng.gen_range(0..pool.len());
            selected.push(pool.swap_remove(picked).0);
        }

        if selected.is_empty() {
            return Err(Error::NoTipsAvailable);
        }

        for tip in &selected {
            tracked.remove(tip);
        }

        // Untrack the ancestors of the picked tips so they cannot be
        // selected again.
        for tip in selected.clone() {
            let _ = traversal::traverse_approvees(
                tangle,
                tip,
                |cached_metadata| Ok(!cached_metadata.is_confirmed()),
                |cached_metadata| {
                    tracked.remove(cached_metadata.hash());
                    Ok(())
                },
                |_| Ok(()),
                |_| {},
                false,
                false,
                false,
                None,
            );
        }

        Ok(selected)
    }
}
