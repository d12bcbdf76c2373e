// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The coordinator background tasks: a milestone ticker and the main loop
//! selecting over checkpoint, milestone and shutdown signals.

use crate::{coordinator::Coordinator, error::Error, event::{IssuedCheckpointTransaction, IssuedMilestone}, mselection::HeaviestSelector};

use vespa_common::shutdown_stream::ShutdownStream;
use vespa_tangle::{
    event::{BundleSolid, MilestoneConfirmed},
    solidifier, traversal, CachedMetadata, Tangle,
};

use futures::{channel::oneshot, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::IntervalStream;

use std::{any::TypeId, sync::Arc, time::Instant};

/// Owner type of the coordinator's bus listeners.
pub struct CoordinatorWorker;

/// Checks the below-max-depth criterion for the given tail: the tip is too
/// old to build on when the solid milestone has moved more than
/// `below_max_depth` past its oldest transaction root snapshot index.
pub fn is_below_max_depth(tangle: &Tangle, tail_metadata: &CachedMetadata, below_max_depth: u32) -> bool {
    let lsmi = tangle.get_solid_milestone_index();

    let otrsi = match tail_metadata.otrsi() {
        Some(otrsi) => otrsi,
        None => match traversal::transaction_root_snapshot_indexes(tangle, tail_metadata.hash()) {
            Some((_, otrsi)) => otrsi,
            None => return false,
        },
    };

    (*lsmi).saturating_sub(*otrsi) > below_max_depth
}

fn attach_events(
    tangle: &Arc<Tangle>,
    selector: &Arc<HeaviestSelector>,
    below_max_depth: u32,
    max_tracked_tails: usize,
    checkpoint_signal: mpsc::Sender<()>,
) {
    let bus = tangle.bus();

    {
        let tangle = tangle.clone();
        let selector = selector.clone();

        // Pass all new solid bundles to the selector, and request a
        // checkpoint once enough tails are tracked.
        bus.add_listener::<CoordinatorWorker, BundleSolid, _>(move |event| {
            let cached_bundle = match tangle.get_bundle(&event.0) {
                Some(cached_bundle) => cached_bundle,
                None => return,
            };

            // Ignore invalid bundles, semantically invalid bundles and
            // bundles with an invalid past cone.
            if cached_bundle.is_invalid_past_cone()
                || !cached_bundle.is_valid(&tangle)
                || !cached_bundle.valid_strict_semantics(&tangle)
            {
                cached_bundle.release(false);
                return;
            }

            let cached_metadata = cached_bundle.get_tail_metadata(&tangle);
            let too_old = is_below_max_depth(&tangle, &cached_metadata, below_max_depth);
            cached_metadata.release(true);

            if too_old {
                cached_bundle.release(false);
                return;
            }

            let tracked_tails_count = selector.on_new_solid_bundle(&tangle, event.0);
            cached_bundle.release(false);

            if tracked_tails_count >= max_tracked_tails {
                debug!("Coordinator tip selector: tracked tails count: {}.", tracked_tails_count);

                // Do not block if another signal is already waiting.
                let _ = checkpoint_signal.try_send(());
            }
        });
    }

    {
        let tangle = tangle.clone();

        // Propagate fresh root snapshot indexes to the future cone after a
        // confirmation; not needed while syncing.
        bus.add_listener::<CoordinatorWorker, MilestoneConfirmed, _>(move |event| {
            if !tangle.is_synced_with_threshold() {
                return;
            }

            let started = Instant::now();
            traversal::update_transaction_root_snapshot_indexes(&tangle, &event.referenced_tails);
            debug!(
                "Updating transaction root snapshot indexes finished, took {:?}.",
                started.elapsed()
            );
        });
    }

    bus.add_listener::<CoordinatorWorker, IssuedCheckpointTransaction, _>(|event| {
        info!(
            "Checkpoint ({}) transaction issued ({}/{}): {}.",
            event.checkpoint_index + 1,
            event.tip_index + 1,
            event.tips_total,
            event.hash
        );
    });

    bus.add_listener::<CoordinatorWorker, IssuedMilestone, _>(|event| {
        info!("Milestone issued ({}): {}.", event.index, event.tail);
    });
}

/// Runs the coordinator until the shutdown signal fires: a ticker requests a
/// milestone every interval, solid bundles accumulate into checkpoints, and
/// issuance rotates the checkpoint/milestone chain.
///
/// A failed bootstrap or a critical issuance error panics; operator
/// intervention is required.
pub async fn run(
    coordinator: Arc<Coordinator>,
    selector: Arc<HeaviestSelector>,
    tangle: Arc<Tangle>,
    below_max_depth: u32,
    shutdown: oneshot::Receiver<()>,
) {
    let max_tracked_tails = coordinator.config().tipsel().max_tracked_tails();

    let (checkpoint_signal, mut checkpoint_rx) = mpsc::channel::<()>(1);
    // Buffered so a signal is not lost if a checkpoint is generated at the
    // same time.
    let (milestone_signal, mut milestone_rx) = mpsc::channel::<()>(1);

    attach_events(&tangle, &selector, below_max_depth, max_tracked_tails, checkpoint_signal);

    // Bootstrap the network if not done yet.
    let mut last_milestone_hash = match coordinator.bootstrap(&tangle) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Bootstrapping the coordinator failed: {}.", e);
            panic!("Aborting due to critical coordinator error.");
        }
    };

    let mut last_checkpoint_hash = last_milestone_hash;
    let mut last_checkpoint_index: usize = 0;

    // The ticker ends when its sender is dropped at the end of this task.
    let (ticker_shutdown_tx, ticker_shutdown_rx) = oneshot::channel::<()>();
    let ticker = {
        let interval = coordinator.interval();
        let milestone_signal = milestone_signal.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = ShutdownStream::new(ticker_shutdown_rx, IntervalStream::new(tokio::time::interval_at(start, interval)));

            while ticker.next().await.is_some() {
                // Do not block if another signal is already waiting.
                let _ = milestone_signal.try_send(());
            }
        })
    };

    info!("Coordinator running.");

    let mut shutdown = shutdown;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            Some(()) = checkpoint_rx.recv() => {
                // Check the threshold again; a milestone could have been
                // issued in the meantime.
                if selector.tracked_tails_count() < max_tracked_tails {
                    continue;
                }

                let tips = match selector.select_tips(&tangle, 0) {
                    Ok(tips) => tips,
                    Err(e) => {
                        // Failing to issue a checkpoint is not critical.
                        if !matches!(e, Error::NoTipsAvailable) {
                            warn!("{}", e);
                        }
                        continue;
                    }
                };

                match coordinator.issue_checkpoint(&tangle, last_checkpoint_index, last_checkpoint_hash, tips) {
                    Ok(checkpoint_hash) => {
                        last_checkpoint_index += 1;
                        last_checkpoint_hash = checkpoint_hash;
                    }
                    Err(e) => warn!("{}", e),
                }
            }

            Some(()) = milestone_rx.recv() => {
                // Issue a checkpoint right in front of the milestone.
                match selector.select_tips(&tangle, 1) {
                    Ok(tips) => {
                        match coordinator.issue_checkpoint(&tangle, last_checkpoint_index, last_checkpoint_hash, tips) {
                            Ok(checkpoint_hash) => last_checkpoint_hash = checkpoint_hash,
                            Err(e) => warn!("{}", e),
                        }
                    }
                    Err(e) => {
                        if !matches!(e, Error::NoTipsAvailable) {
                            warn!("{}", e);
                        }
                    }
                }

                match coordinator.issue_milestone(&tangle, last_milestone_hash, last_checkpoint_hash) {
                    Ok(milestone_hash) => {
                        last_milestone_hash = milestone_hash;
                        last_checkpoint_hash = milestone_hash;
                        last_checkpoint_index = 0;
                    }
                    Err(e) if e.is_critical() => {
                        error!("{}", e);
                        panic!("Aborting due to critical coordinator error.");
                    }
                    Err(Error::NodeNotSynced) => {
                        // Trigger the solidifier manually and try again next
                        // interval.
                        solidifier::trigger_solidifier(&tangle);
                        warn!("{}", Error::NodeNotSynced);
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    drop(ticker_shutdown_tx);
    let _ = ticker.await;

    tangle.bus().purge_listeners(TypeId::of::<CoordinatorWorker>());

    info!("Coordinator stopped.");
}
