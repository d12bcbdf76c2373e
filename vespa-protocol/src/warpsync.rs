// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Catching up to a peer's solid milestone in fixed ranges.

use crate::{
    event::{CheckpointUpdated, HeartbeatUpdated, PeerConnected, SyncDone, SyncStarted, TargetUpdated},
    rqueue::{Request, RequestQueue},
};

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::event::Bus;
use vespa_tangle::{event::SolidMilestoneIndexChanged, solidifier, Tangle};

use log::info;
use serde::Deserialize;

use std::{
    any::TypeId,
    sync::{Arc, Mutex},
    time::Instant,
};

const DEFAULT_ADVANCEMENT_RANGE: u32 = 50;

/// Builder for a [`WarpSyncConfig`].
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpSyncConfigBuilder {
    advancement_range: Option<u32>,
}

impl WarpSyncConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many milestones a checkpoint advances at a time.
    pub fn advancement_range(mut self, advancement_range: u32) -> Self {
        self.advancement_range.replace(advancement_range);
        self
    }

    /// Builds the config.
    pub fn finish(self) -> WarpSyncConfig {
        WarpSyncConfig {
            advancement_range: self.advancement_range.unwrap_or(DEFAULT_ADVANCEMENT_RANGE),
        }
    }
}

/// Configuration of the warp-sync controller.
#[derive(Clone)]
pub struct WarpSyncConfig {
    pub(crate) advancement_range: u32,
}

impl WarpSyncConfig {
    /// How many milestones a checkpoint advances at a time.
    pub fn advancement_range(&self) -> u32 {
        self.advancement_range
    }
}

struct Inner {
    current: MilestoneIndex,
    target: MilestoneIndex,
    next_checkpoint: MilestoneIndex,
    /// `(index at start, start time)` while a synchronization is running.
    started: Option<(MilestoneIndex, Instant)>,
}

enum Transition {
    None,
    Started(SyncStarted),
    Checkpoint(CheckpointUpdated),
    Done(SyncDone),
}

/// Tracks the `(current, target, next checkpoint)` window of a catch-up run
/// and drives milestone range requests through events.
pub struct WarpSync {
    bus: Arc<Bus<'static>>,
    advancement_range: u32,
    inner: Mutex<Inner>,
}

impl WarpSync {
    /// Creates a warp-sync controller dispatching on the given bus.
    pub fn new(config: WarpSyncConfig, bus: Arc<Bus<'static>>) -> Self {
        Self {
            bus,
            advancement_range: config.advancement_range,
            inner: Mutex::new(Inner {
                current: MilestoneIndex(0),
                target: MilestoneIndex(0),
                next_checkpoint: MilestoneIndex(0),
                started: None,
            }),
        }
    }

    /// The current solid milestone index known to the controller.
    pub fn current(&self) -> MilestoneIndex {
        self.inner.lock().unwrap().current
    }

    /// The target milestone index.
    pub fn target(&self) -> MilestoneIndex {
        self.inner.lock().unwrap().target
    }

    /// The next checkpoint milestone index, zero while inactive.
    pub fn next_checkpoint(&self) -> MilestoneIndex {
        self.inner.lock().unwrap().next_checkpoint
    }

    /// Whether a synchronization is running.
    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().started.is_some()
    }

    /// Advances the current index, moving the checkpoint window and
    /// finishing the run when the target is reached.
    pub fn update_current(&self, index: MilestoneIndex) {
        let transition = {
            let mut inner = self.inner.lock().unwrap();

            if index <= inner.current {
                Transition::None
            } else {
                inner.current = index;

                match inner.started {
                    Some((start_index, started_at)) if index >= inner.target => {
                        let synced = *inner.target - *start_index;
                        inner.started = None;
                        inner.next_checkpoint = MilestoneIndex(0);

                        Transition::Done(SyncDone {
                            synced,
                            took: started_at.elapsed(),
                        })
                    }
                    Some(_) if index >= inner.next_checkpoint => {
                        let old_checkpoint = inner.next_checkpoint;
                        inner.next_checkpoint =
                            MilestoneIndex((*index + self.advancement_range).min(*inner.target));

                        Transition::Checkpoint(CheckpointUpdated {
                            next_checkpoint: inner.next_checkpoint,
                            old_checkpoint,
                            advancement_range: self.advancement_range,
                        })
                    }
                    _ => Transition::None,
                }
            }
        };

        self.dispatch(transition);
    }

    /// Raises the target index; starts a run when the delta to the current
    /// index exceeds the advancement range.
    pub fn update_target(&self, target: MilestoneIndex) {
        let (updated, transition) = {
            let mut inner = self.inner.lock().unwrap();

            if target <= inner.target {
                (None, Transition::None)
            } else {
                inner.target = target;

                let transition = if inner.started.is_none() && *target - *inner.current > self.advancement_range {
                    inner.started = Some((inner.current, Instant::now()));
                    inner.next_checkpoint = MilestoneIndex((*inner.current + self.advancement_range).min(*target));

                    Transition::Started(SyncStarted {
                        target,
                        next_checkpoint: inner.next_checkpoint,
                        advancement_range: self.advancement_range,
                    })
                } else {
                    Transition::None
                };

                (Some(target), transition)
            }
        };

        if let Some(target) = updated {
            self.bus.dispatch(TargetUpdated { target });
        }

        self.dispatch(transition);
    }

    fn dispatch(&self, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::Started(event) => self.bus.dispatch(event),
            Transition::Checkpoint(event) => self.bus.dispatch(event),
            Transition::Done(event) => self.bus.dispatch(event),
        }
    }
}

/// Enqueues requests for the milestones following `from` (or the solid
/// milestone index) that are not stored yet. Returns how many were requested.
pub fn broadcast_milestone_requests(
    tangle: &Tangle,
    queue: &RequestQueue,
    range: u32,
    from: Option<MilestoneIndex>,
) -> usize {
    let starting_point = from.unwrap_or_else(|| tangle.get_solid_milestone_index());
    let mut requested = 0;

    for i in 1..=range {
        let index = starting_point + i;

        if !tangle.contains_milestone(index) {
            // The tail hash is unknown; peers answer milestone requests by
            // index.
            if queue.enqueue(Request {
                hash: Hash::NULL,
                milestone_index: index,
            }) {
                requested += 1;
            }
        }
    }

    requested
}

/// Wires the warp-sync controller to the bus: heartbeats raise the target,
/// solid milestone changes advance the window, checkpoint changes bound the
/// request queue and request the next milestone range.
pub struct WarpSyncWorker;

impl WarpSyncWorker {
    /// Attaches all handlers.
    pub fn attach(bus: &Bus<'static>, warp_sync: Arc<WarpSync>, tangle: Arc<Tangle>, queue: Arc<RequestQueue>) {
        {
            let warp_sync = warp_sync.clone();
            let tangle = tangle.clone();
            bus.add_listener::<Self, HeartbeatUpdated, _>(move |event| {
                tangle.update_latest_milestone_index(MilestoneIndex(event.heartbeat.latest_milestone_index));
                warp_sync.update_current(tangle.get_solid_milestone_index());
                warp_sync.update_target(MilestoneIndex(event.heartbeat.solid_milestone_index));
            });
        }

        bus.add_listener::<Self, PeerConnected, _>(|event| {
            info!("Peer {} connected.", event.peer_id);
        });

        {
            let warp_sync = warp_sync;
            bus.add_listener::<Self, SolidMilestoneIndexChanged, _>(move |event| {
                warp_sync.update_current(event.0);
            });
        }

        bus.add_listener::<Self, TargetUpdated, _>(|event| {
            info!("Target updated to milestone {}.", event.target);
        });

        {
            let tangle = tangle.clone();
            let queue = queue.clone();
            bus.add_listener::<Self, CheckpointUpdated, _>(move |event| {
                info!("Checkpoint updated to milestone {}.", event.next_checkpoint);

                let next_checkpoint = event.next_checkpoint;
                queue.filter(Some(move |request: &Request| {
                    request.milestone_index <= next_checkpoint
                }));

                broadcast_milestone_requests(&tangle, &queue, event.advancement_range, Some(event.old_checkpoint));
            });
        }

        {
            let tangle = tangle;
            let queue = queue.clone();
            bus.add_listener::<Self, SyncStarted, _>(move |event| {
                info!("Synchronizing to milestone {}.", event.target);

                let next_checkpoint = event.next_checkpoint;
                queue.filter(Some(move |request: &Request| {
                    request.milestone_index <= next_checkpoint
                }));

                let requested = broadcast_milestone_requests(&tangle, &queue, event.advancement_range, None);

                // Fewer requested than the range means some milestones were
                // already stored; they will not arrive from peers, so the
                // solidifier has to pick them up.
                if requested != event.advancement_range as usize {
                    info!("Manually starting solidifier, as some milestones are already in the database.");
                    solidifier::trigger_solidifier(&tangle);
                }
            });
        }

        bus.add_listener::<Self, SyncDone, _>(move |event| {
            info!("Synchronized {} milestones in {:?}.", event.synced, event.took);
            queue.filter(None::<fn(&Request) -> bool>);
        });
    }

    /// Detaches all handlers.
    pub fn detach(bus: &Bus<'static>) {
        bus.purge_listeners(TypeId::of::<Self>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    fn warp_sync(advancement_range: u32) -> (Arc<Bus<'static>>, WarpSync) {
        let bus = Arc::new(Bus::default());
        let warp_sync = WarpSync::new(
            WarpSyncConfigBuilder::new().advancement_range(advancement_range).finish(),
            bus.clone(),
        );

        (bus, warp_sync)
    }

    #[test]
    fn starts_when_delta_exceeds_advancement_range() {
        let (bus, warp_sync) = warp_sync(10);

        let started = Arc::new(AtomicU32::new(0));
        {
            let started = started.clone();
            bus.add_static_listener(move |event: &SyncStarted| {
                started.store(*event.target, Ordering::SeqCst);
            });
        }

        // Within range: no run.
        warp_sync.update_target(MilestoneIndex(5));
        assert!(!warp_sync.is_active());

        warp_sync.update_target(MilestoneIndex(100));
        assert!(warp_sync.is_active());
        assert_eq!(started.load(Ordering::SeqCst), 100);
        assert_eq!(warp_sync.next_checkpoint(), MilestoneIndex(10));
    }

    #[test]
    fn checkpoints_advance_by_range_and_finish_at_target() {
        let (bus, warp_sync) = warp_sync(10);

        let done = Arc::new(AtomicU32::new(0));
        {
            let done = done.clone();
            bus.add_static_listener(move |event: &SyncDone| {
                done.store(event.synced, Ordering::SeqCst);
            });
        }

        warp_sync.update_target(MilestoneIndex(25));
        assert_eq!(warp_sync.next_checkpoint(), MilestoneIndex(10));

        warp_sync.update_current(MilestoneIndex(10));
        assert_eq!(warp_sync.next_checkpoint(), MilestoneIndex(20));

        warp_sync.update_current(MilestoneIndex(20));
        // The checkpoint is clamped to the target.
        assert_eq!(warp_sync.next_checkpoint(), MilestoneIndex(25));

        warp_sync.update_current(MilestoneIndex(25));
        assert!(!warp_sync.is_active());
        assert_eq!(done.load(Ordering::SeqCst), 25);
    }

    #[test]
    fn stale_updates_are_ignored() {
        let (_bus, warp_sync) = warp_sync(10);

        warp_sync.update_target(MilestoneIndex(100));
        warp_sync.update_target(MilestoneIndex(50));
        assert_eq!(warp_sync.target(), MilestoneIndex(100));

        warp_sync.update_current(MilestoneIndex(30));
        warp_sync.update_current(MilestoneIndex(20));
        assert_eq!(warp_sync.current(), MilestoneIndex(30));
    }
}
