// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use self::common::*;

use vespa_bundle::MilestoneIndex;
use vespa_tangle::{
    snapshot::{export_snapshot, LocalSnapshot, SnapshotInfo},
    Error,
};

#[test]
fn snapshot_file_round_trip_through_the_tangle() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("local.snapshot");

    let sep = hash(0x11);
    let spent = hash(0x22);

    {
        let tangle = test_tangle();
        tangle.add_solid_entry_point(sep, MilestoneIndex(4));
        tangle.mark_address_as_spent(spent);
        tangle.set_snapshot_info(SnapshotInfo::new(
            coordinator_address(),
            MilestoneIndex(6),
            MilestoneIndex(4),
            1_600_000_000,
            true,
        ));

        let snapshot = export_snapshot(&tangle, None).unwrap();
        snapshot.to_file(&path).unwrap();
    }

    let snapshot = LocalSnapshot::from_file(&path).unwrap();
    assert_eq!(snapshot.pruning_index(), MilestoneIndex(4));

    let tangle = vespa_tangle::Tangle::new(
        std::sync::Arc::new(vespa_storage_memory::MemoryBackend::new()),
        vespa_tangle::TangleConfigBuilder::new().finish(coordinator_address()),
        std::sync::Arc::new(vespa_common::event::Bus::default()),
    );
    snapshot.apply(&tangle);

    assert!(tangle.solid_entry_points_contain(&sep));
    assert_eq!(tangle.solid_entry_point_index(&sep), Some(MilestoneIndex(4)));
    assert!(tangle.was_address_spent_from(&spent));
}

#[test]
fn export_honors_the_abort_channel() {
    let tangle = test_tangle();
    tangle.mark_address_as_spent(hash(0x22));

    let (sender, receiver) = flume::bounded::<()>(1);
    sender.send(()).unwrap();

    assert!(matches!(export_snapshot(&tangle, Some(&receiver)), Err(Error::OperationAborted)));
}
