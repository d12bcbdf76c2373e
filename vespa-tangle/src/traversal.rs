// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Past-cone (approvee) and future-cone (approver) walkers.
//!
//! Both walkers separate the *predicate*, deciding whether to traverse
//! further from a visited node, from the *consumer*, invoked on each accepted
//! node in visit order. Caution: the predicate is not invoked in visit order.

use crate::{tangle::CachedMetadata, AbortSignal, Error, Tangle};

use vespa_bundle::{Hash, MilestoneIndex};

use std::collections::{HashSet, VecDeque};

fn aborted(abort: Option<&AbortSignal>) -> bool {
    match abort {
        Some(abort) => abort.try_recv() != Err(flume::TryRecvError::Empty),
        None => false,
    }
}

/// A depth-first walker over the past cone of a transaction, following trunk
/// and branch references. The trunk subtree of a node is visited strictly
/// before its branch subtree; shared ancestors are visited once.
pub struct ApproveesTraverser<'a, P, C, M, S>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
    M: FnMut(&Hash) -> Result<(), Error>,
    S: FnMut(&Hash),
{
    tangle: &'a Tangle,
    predicate: P,
    consumer: C,
    on_missing_approvee: M,
    on_solid_entry_point: S,
    abort: Option<&'a AbortSignal>,
    stack: Vec<Hash>,
    processed: HashSet<Hash>,
    traverse_solid_entry_points: bool,
    traverse_tails_only: bool,
    force_release: bool,
}

impl<'a, P, C, M, S> ApproveesTraverser<'a, P, C, M, S>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
    M: FnMut(&Hash) -> Result<(), Error>,
    S: FnMut(&Hash),
{
    /// Creates a walker with the given callbacks and abort channel.
    pub fn new(
        tangle: &'a Tangle,
        predicate: P,
        consumer: C,
        on_missing_approvee: M,
        on_solid_entry_point: S,
        abort: Option<&'a AbortSignal>,
    ) -> Self {
        Self {
            tangle,
            predicate,
            consumer,
            on_missing_approvee,
            on_solid_entry_point,
            abort,
            stack: Vec::new(),
            processed: HashSet::new(),
            traverse_solid_entry_points: false,
            traverse_tails_only: false,
            force_release: false,
        }
    }

    /// Walks the past cone of the given start transaction.
    pub fn traverse(
        &mut self,
        start: Hash,
        traverse_solid_entry_points: bool,
        traverse_tails_only: bool,
        force_release: bool,
    ) -> Result<(), Error> {
        self.traverse_solid_entry_points = traverse_solid_entry_points;
        self.traverse_tails_only = traverse_tails_only;
        self.force_release = force_release;

        self.stack.push(start);
        self.process_stack()
    }

    /// Walks the past cone of the trunk transaction, then the past cone of
    /// the branch transaction. The second walk sees the hashes already
    /// processed by the first, so shared ancestors are visited once.
    pub fn traverse_trunk_and_branch(
        &mut self,
        trunk: Hash,
        branch: Hash,
        traverse_solid_entry_points: bool,
        traverse_tails_only: bool,
        force_release: bool,
    ) -> Result<(), Error> {
        self.traverse_solid_entry_points = traverse_solid_entry_points;
        self.traverse_tails_only = traverse_tails_only;
        self.force_release = force_release;

        self.stack.push(trunk);
        self.process_stack()?;

        self.stack.push(branch);
        self.process_stack()
    }

    fn process_stack(&mut self) -> Result<(), Error> {
        while let Some(hash) = self.stack.pop() {
            if aborted(self.abort) {
                return Err(Error::OperationAborted);
            }

            if self.processed.contains(&hash) {
                continue;
            }
            self.processed.insert(hash);

            if self.tangle.solid_entry_points_contain(&hash) {
                (self.on_solid_entry_point)(&hash);

                if !self.traverse_solid_entry_points {
                    continue;
                }
            }

            let cached_metadata = match self.tangle.get_metadata(&hash) {
                Some(cached_metadata) => cached_metadata,
                None => {
                    (self.on_missing_approvee)(&hash)?;
                    continue;
                }
            };

            let proceed = match (self.predicate)(&cached_metadata) {
                Ok(proceed) => proceed,
                Err(e) => {
                    cached_metadata.release(self.force_release);
                    return Err(e);
                }
            };

            if !proceed {
                cached_metadata.release(self.force_release);
                continue;
            }

            if !self.traverse_tails_only || cached_metadata.is_tail() {
                if let Err(e) = (self.consumer)(&cached_metadata) {
                    cached_metadata.release(self.force_release);
                    return Err(e);
                }
            }

            // Branch first so the trunk is popped, and therefore visited,
            // first.
            self.stack.push(*cached_metadata.branch());
            self.stack.push(*cached_metadata.trunk());

            cached_metadata.release(self.force_release);
        }

        Ok(())
    }
}

/// A breadth-first walker over the future cone of a transaction, following
/// the approver sets. Unordered, because the approver repository stores an
/// unordered set.
pub struct ApproversTraverser<'a, P, C>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
{
    tangle: &'a Tangle,
    predicate: P,
    consumer: C,
    abort: Option<&'a AbortSignal>,
    queue: VecDeque<Hash>,
    processed: HashSet<Hash>,
}

impl<'a, P, C> ApproversTraverser<'a, P, C>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
{
    /// Creates a walker with the given callbacks and abort channel.
    pub fn new(tangle: &'a Tangle, predicate: P, consumer: C, abort: Option<&'a AbortSignal>) -> Self {
        Self {
            tangle,
            predicate,
            consumer,
            abort,
            queue: VecDeque::new(),
            processed: HashSet::new(),
        }
    }

    /// Walks the future cone of the given start transaction.
    pub fn traverse(&mut self, start: Hash, force_release: bool) -> Result<(), Error> {
        self.queue.push_back(start);

        while let Some(hash) = self.queue.pop_front() {
            if aborted(self.abort) {
                return Err(Error::OperationAborted);
            }

            if self.processed.contains(&hash) {
                continue;
            }
            self.processed.insert(hash);

            let cached_metadata = match self.tangle.get_metadata(&hash) {
                Some(cached_metadata) => cached_metadata,
                // Approvers of pruned or unknown transactions are skipped.
                None => continue,
            };

            let proceed = match (self.predicate)(&cached_metadata) {
                Ok(proceed) => proceed,
                Err(e) => {
                    cached_metadata.release(force_release);
                    return Err(e);
                }
            };

            if !proceed {
                cached_metadata.release(force_release);
                continue;
            }

            if let Err(e) = (self.consumer)(&cached_metadata) {
                cached_metadata.release(force_release);
                return Err(e);
            }

            cached_metadata.release(force_release);

            for approver in self.tangle.get_approvers(&hash) {
                self.queue.push_back(approver);
            }
        }

        Ok(())
    }
}

/// Walks the past cone of `start` depth first, trunk before branch.
#[allow(clippy::too_many_arguments)]
pub fn traverse_approvees<P, C, M, S>(
    tangle: &Tangle,
    start: Hash,
    predicate: P,
    consumer: C,
    on_missing_approvee: M,
    on_solid_entry_point: S,
    traverse_solid_entry_points: bool,
    traverse_tails_only: bool,
    force_release: bool,
    abort: Option<&AbortSignal>,
) -> Result<(), Error>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
    M: FnMut(&Hash) -> Result<(), Error>,
    S: FnMut(&Hash),
{
    ApproveesTraverser::new(tangle, predicate, consumer, on_missing_approvee, on_solid_entry_point, abort).traverse(
        start,
        traverse_solid_entry_points,
        traverse_tails_only,
        force_release,
    )
}

/// Walks the past cones of `trunk` and `branch` as one combined walk.
#[allow(clippy::too_many_arguments)]
pub fn traverse_approvees_trunk_branch<P, C, M, S>(
    tangle: &Tangle,
    trunk: Hash,
    branch: Hash,
    predicate: P,
    consumer: C,
    on_missing_approvee: M,
    on_solid_entry_point: S,
    traverse_solid_entry_points: bool,
    traverse_tails_only: bool,
    force_release: bool,
    abort: Option<&AbortSignal>,
) -> Result<(), Error>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
    M: FnMut(&Hash) -> Result<(), Error>,
    S: FnMut(&Hash),
{
    ApproveesTraverser::new(tangle, predicate, consumer, on_missing_approvee, on_solid_entry_point, abort)
        .traverse_trunk_and_branch(
            trunk,
            branch,
            traverse_solid_entry_points,
            traverse_tails_only,
            force_release,
        )
}

/// Walks the future cone of `start` breadth first.
pub fn traverse_approvers<P, C>(
    tangle: &Tangle,
    start: Hash,
    predicate: P,
    consumer: C,
    force_release: bool,
    abort: Option<&AbortSignal>,
) -> Result<(), Error>
where
    P: FnMut(&CachedMetadata) -> Result<bool, Error>,
    C: FnMut(&CachedMetadata) -> Result<(), Error>,
{
    ApproversTraverser::new(tangle, predicate, consumer, abort).traverse(start, force_release)
}

/// Searches all tail transactions the given start transaction references.
/// With `skip_start` the start transaction itself is traversed even if it is
/// a tail.
pub fn find_all_tails(
    tangle: &Tangle,
    start: Hash,
    skip_start: bool,
    force_release: bool,
) -> Result<HashSet<Hash>, Error> {
    let mut tails = HashSet::new();

    traverse_approvees(
        tangle,
        start,
        |cached_metadata| {
            if skip_start && cached_metadata.hash() == &start {
                return Ok(true);
            }

            if cached_metadata.is_tail() {
                tails.insert(*cached_metadata.hash());
                return Ok(false);
            }

            Ok(true)
        },
        |_| Ok(()),
        |hash| Err(Error::TransactionNotFound(*hash)),
        |_| {},
        false,
        false,
        force_release,
        None,
    )?;

    Ok(tails)
}

fn boundary_indexes(tangle: &Tangle, hash: &Hash) -> Option<(MilestoneIndex, MilestoneIndex)> {
    if let Some(index) = tangle.solid_entry_point_index(hash) {
        return Some((index, index));
    }

    let cached_metadata = tangle.get_metadata(hash)?;
    let indexes = match (cached_metadata.ytrsi(), cached_metadata.otrsi()) {
        (Some(ytrsi), Some(otrsi)) => Some((ytrsi, otrsi)),
        _ => None,
    };
    cached_metadata.release(false);

    indexes
}

/// Computes the youngest and oldest transaction root snapshot indexes of the
/// given tail by walking its past cone up to already-indexed or solid entry
/// point boundaries, and memoizes the result in its metadata.
pub fn transaction_root_snapshot_indexes(tangle: &Tangle, tail: &Hash) -> Option<(MilestoneIndex, MilestoneIndex)> {
    if let Some(indexes) = boundary_indexes(tangle, tail) {
        return Some(indexes);
    }

    // Shared between the predicate and the solid entry point callback.
    let accumulated = std::cell::RefCell::new((None::<MilestoneIndex>, None::<MilestoneIndex>));
    let collect = |indexes: (MilestoneIndex, MilestoneIndex)| {
        let mut accumulated = accumulated.borrow_mut();
        accumulated.0 = Some(accumulated.0.map_or(indexes.0, |y| y.max(indexes.0)));
        accumulated.1 = Some(accumulated.1.map_or(indexes.1, |o| o.min(indexes.1)));
    };

    traverse_approvees(
        tangle,
        *tail,
        |cached_metadata| {
            if cached_metadata.hash() == tail {
                return Ok(true);
            }

            match (cached_metadata.ytrsi(), cached_metadata.otrsi()) {
                (Some(y), Some(o)) => {
                    collect((y, o));
                    Ok(false)
                }
                _ => Ok(true),
            }
        },
        |_| Ok(()),
        // Unknown ancestors simply do not contribute a boundary.
        |_| Ok(()),
        |hash| {
            if let Some(index) = tangle.solid_entry_point_index(hash) {
                collect((index, index));
            }
        },
        false,
        false,
        false,
        None,
    )
    .ok()?;

    let (ytrsi, otrsi) = accumulated.into_inner();
    let (ytrsi, otrsi) = (ytrsi?, otrsi?);

    if let Some(cached_metadata) = tangle.get_metadata(tail) {
        cached_metadata.set_root_snapshot_indexes(ytrsi, otrsi);
        cached_metadata.release(false);
    }

    Some((ytrsi, otrsi))
}

/// Propagates fresh root snapshot indexes into the future cones of the tails
/// a milestone just confirmed.
pub fn update_transaction_root_snapshot_indexes(tangle: &Tangle, referenced_tails: &[Hash]) {
    for tail in referenced_tails {
        // Errors cannot occur: the callbacks are infallible and no abort
        // channel is passed.
        let _ = traverse_approvers(
            tangle,
            *tail,
            |cached_metadata| {
                if cached_metadata.is_confirmed() {
                    return Ok(true);
                }

                let trunk = boundary_indexes(tangle, cached_metadata.trunk());
                let branch = boundary_indexes(tangle, cached_metadata.branch());

                match (trunk, branch) {
                    (Some((trunk_ytrsi, trunk_otrsi)), Some((branch_ytrsi, branch_otrsi))) => {
                        cached_metadata
                            .set_root_snapshot_indexes(trunk_ytrsi.max(branch_ytrsi), trunk_otrsi.min(branch_otrsi));
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            },
            |_| Ok(()),
            false,
            None,
        );
    }
}
