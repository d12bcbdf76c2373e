// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The bundle emitter handed to the coordinator: publishes each transaction
//! through the storage layer (standing in for the gossip pipeline) and waits
//! until every transaction's `ProcessedTransaction` event fired, and, for
//! milestones, until `SolidMilestoneIndexChanged` fired.

use vespa_bundle::{Hash, Transaction};
use vespa_coordinator::SendBundle;
use vespa_tangle::{
    event::{ProcessedTransaction, SolidMilestoneIndexChanged},
    Tangle,
};

use std::{
    any::TypeId,
    collections::HashSet,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// Owner type of the emitter's temporary bus listeners.
struct BundleProcessedWaiter;

/// How long the emitter waits for the storage layer before giving up.
const EMIT_TIMEOUT: Duration = Duration::from_secs(30);

struct WaitState {
    pending: HashSet<Hash>,
    solid_milestone_changed: bool,
}

/// Creates the `send_bundle` callback over the given tangle.
pub fn tangle_emitter(tangle: Arc<Tangle>) -> SendBundle {
    Box::new(move |transactions: &[Transaction], is_milestone: bool| {
        let waiter = Arc::new((
            Mutex::new(WaitState {
                pending: transactions.iter().map(Transaction::hash).collect(),
                solid_milestone_changed: !is_milestone,
            }),
            Condvar::new(),
        ));

        let bus = tangle.bus();

        {
            let waiter = waiter.clone();
            bus.add_listener::<BundleProcessedWaiter, ProcessedTransaction, _>(move |event| {
                let (state, condvar) = &*waiter;
                state.lock().unwrap().pending.remove(&event.0);
                condvar.notify_all();
            });
        }

        if is_milestone {
            let waiter = waiter.clone();
            bus.add_listener::<BundleProcessedWaiter, SolidMilestoneIndexChanged, _>(move |_| {
                let (state, condvar) = &*waiter;
                state.lock().unwrap().solid_milestone_changed = true;
                condvar.notify_all();
            });
        }

        for transaction in transactions {
            let (cached_transaction, was_new) = tangle.store_transaction_if_absent(transaction.clone());
            let hash = *cached_transaction.hash();
            cached_transaction.release(false);

            // Re-emitted transactions fire no event; do not wait for them.
            if !was_new {
                let (state, condvar) = &*waiter;
                state.lock().unwrap().pending.remove(&hash);
                condvar.notify_all();
            }
        }

        let result = {
            let (state, condvar) = &*waiter;
            let mut state = state.lock().unwrap();

            loop {
                if state.pending.is_empty() && state.solid_milestone_changed {
                    break Ok(());
                }

                let (next, timeout) = condvar.wait_timeout(state, EMIT_TIMEOUT).unwrap();
                state = next;

                if timeout.timed_out() {
                    break Err("timed out waiting for the bundle to be processed".into());
                }
            }
        };

        bus.purge_listeners(TypeId::of::<BundleProcessedWaiter>());

        result
    })
}
