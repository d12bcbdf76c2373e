// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The default vespa node: configuration, wiring and graceful shutdown.

mod cli;
mod config;
mod emitter;

pub use cli::CliArgs;
pub use config::{NodeConfig, NodeConfigBuilder};
pub use emitter::tangle_emitter;

use vespa_bundle::{Hash, MilestoneIndex};
use vespa_common::{event::Bus, logger};
use vespa_coordinator::{mselection::HeaviestSelector, worker as coordinator_worker, Coordinator, KeyedSigner, MilestoneSigner};
use vespa_protocol::{RequestQueue, WarpSync, WarpSyncWorker};
use vespa_storage_memory::MemoryBackend;
use vespa_tangle::{snapshot::{LocalSnapshot, SnapshotInfo}, Tangle};

use log::info;
use thiserror::Error;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Environment variable holding the coordinator seed.
pub const COO_SEED_ENV: &str = "COO_SEED";

/// Errors terminating the node.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Initializing the logger failed.
    #[error("Initializing the logger failed: {0}")]
    Logger(#[from] logger::Error),
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is malformed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// The coordinator seed environment variable is missing.
    #[error("Environment variable COO_SEED holding the coordinator seed is not set.")]
    MissingSeed,
    /// A tangle operation failed.
    #[error("Tangle error: {0}")]
    Tangle(#[from] vespa_tangle::Error),
    /// A coordinator operation failed.
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] vespa_coordinator::Error),
}

fn seed_from_environment() -> Result<Hash, NodeError> {
    match std::env::var(COO_SEED_ENV) {
        Ok(seed) if !seed.is_empty() => Ok(Hash::digest(seed.as_bytes())),
        _ => Err(NodeError::MissingSeed),
    }
}

/// Runs the node until ctrl-c.
pub async fn run(args: CliArgs) -> Result<(), NodeError> {
    let seed = seed_from_environment()?;

    let config = NodeConfigBuilder::from_file(&args.config)?.finish(seed, args.coo_bootstrap, args.coo_start_index);

    logger::logger_init(config.logger.clone())?;

    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let bus = Arc::new(Bus::default());
    let backend = Arc::new(MemoryBackend::new());
    let tangle = Arc::new(Tangle::new(backend, config.cache.clone(), bus.clone()));

    let signer = KeyedSigner::new(
        seed,
        config.coordinator.merkle_tree_depth(),
        config.coordinator.security_level(),
    );
    let coordinator_address = signer.address();

    // Seed the solid entry points and spent addresses, either from a local
    // snapshot file or freshly for a bootstrapping network.
    match &config.snapshot_path {
        Some(path) => {
            let snapshot = LocalSnapshot::from_file(path)?;
            snapshot.apply(&tangle);

            if tangle.get_snapshot_info().is_none() {
                tangle.set_snapshot_info(SnapshotInfo::new(
                    coordinator_address,
                    snapshot.pruning_index(),
                    snapshot.pruning_index(),
                    unix_timestamp(),
                    true,
                ));
            }
        }
        None => {
            tangle.init_solid_entry_points();

            if tangle.get_snapshot_info().is_none() {
                tangle.set_snapshot_info(SnapshotInfo::new(
                    coordinator_address,
                    MilestoneIndex(0),
                    MilestoneIndex(0),
                    unix_timestamp(),
                    true,
                ));
            }
        }
    }

    // Safe to unwrap: the snapshot info was just stored.
    let snapshot_info = tangle.get_snapshot_info().unwrap();
    tangle.update_solid_milestone_index(snapshot_info.snapshot_index());
    tangle.update_latest_milestone_index(snapshot_info.snapshot_index());

    // Warp-sync reacting to heartbeats and solid milestone changes.
    let warp_sync = Arc::new(WarpSync::new(config.warpsync.clone(), bus.clone()));
    let request_queue = Arc::new(RequestQueue::new());
    WarpSyncWorker::attach(&bus, warp_sync, tangle.clone(), request_queue);

    // The coordinator with its heaviest-branch selector.
    let selector = Arc::new(HeaviestSelector::new(config.coordinator.tipsel().clone()));
    let coordinator = Arc::new(Coordinator::new(
        &tangle,
        config.coordinator.clone(),
        Box::new(signer),
        tangle_emitter(tangle.clone()),
        bus.clone(),
    )?);

    let (shutdown_sender, shutdown_receiver) = futures::channel::oneshot::channel();

    let coordinator_task = tokio::spawn(coordinator_worker::run(
        coordinator,
        selector,
        tangle.clone(),
        config.below_max_depth,
        shutdown_receiver,
    ));

    tokio::signal::ctrl_c().await?;

    info!("Shutting down.");

    let _ = shutdown_sender.send(());
    let _ = coordinator_task.await;

    WarpSyncWorker::detach(&bus);
    tangle.shutdown();

    Ok(())
}

fn unix_timestamp() -> u64 {
    // Safe to unwrap: the system clock is past the epoch.
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}
