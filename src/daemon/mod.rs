use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::sampler::SamplerModule;
use storage::{chunk_storage::ChunkDirectory, store::MeasurementStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    idle_api::{GenericIdleSource, IdleSource},
    utils::{
        clock::{Clock, DefaultClock},
        dir::measurements_dir,
    },
};

pub mod args;
pub mod collection;
pub mod shutdown;
pub mod storage;

pub const DEFAULT_SAMPLING_INTERVAL_SECONDS: u32 = 60;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, interval_seconds: u32) -> Result<()> {
    std::env::set_current_dir("/")?;

    let source = GenericIdleSource::new()?;
    let shutdown_token = CancellationToken::new();

    let store = create_store(measurements_dir(&dir), interval_seconds, DefaultClock);
    let sampler = create_sampler(store, source, &shutdown_token, interval_seconds, DefaultClock);

    info!(
        "{} daemon {} started",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    // The listener only cancels. The sampler notices, flushes and returns, and only then do we
    // let the process go.
    let (_, sampling_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        sampler.run(),
    );

    if let Err(sampling_result) = sampling_result {
        error!("Sampler module got an error {:?}", sampling_result);
    }

    info!(
        "{} daemon {} terminated",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

/// IANA name of the local timezone, recorded in every batch.
fn local_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|e| {
        warn!("Couldn't determine local timezone, recording UTC {e:?}");
        "UTC".into()
    })
}

fn create_store(
    measurements_dir: PathBuf,
    interval_seconds: u32,
    clock: impl Clock,
) -> MeasurementStore<ChunkDirectory> {
    MeasurementStore::new(
        ChunkDirectory::new(measurements_dir),
        interval_seconds,
        local_timezone(),
        Box::new(clock),
    )
}

fn create_sampler(
    store: MeasurementStore<ChunkDirectory>,
    source: impl IdleSource + 'static,
    shutdown_token: &CancellationToken,
    interval_seconds: u32,
    clock: impl Clock,
) -> SamplerModule<MeasurementStore<ChunkDirectory>> {
    SamplerModule::new(
        store,
        Box::new(source),
        shutdown_token.clone(),
        Duration::from_secs(interval_seconds as u64),
        Box::new(clock),
    )
}
