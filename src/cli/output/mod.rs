pub mod segmentation;

use std::{future, sync::Arc};

use anyhow::Result;
use futures::{stream, StreamExt};
use tracing::{debug, instrument, warn};

use crate::daemon::storage::{
    chunk_storage::ChunkStorage,
    entities::{Batch, Measurement},
};

/// Reads every chunk file of `storage` and merges its measurements with `injected`.
///
/// The daemon may be writing while this runs, so a chunk that can't be read or decoded is skipped
/// with a warning instead of failing the whole report.
#[instrument(skip_all)]
pub async fn collect_measurements(
    storage: impl ChunkStorage,
    injected: Vec<Measurement>,
) -> Result<Vec<Measurement>> {
    let storage = Arc::new(storage);
    let chunks = storage.discover_chunks().await?;
    debug!("Found {} chunks", chunks.len());

    let batches = stream::iter(chunks)
        .map(move |path| {
            let storage = storage.clone();
            async move {
                let batch = storage.read_chunk(&path).await;
                (path, batch)
            }
        })
        .buffered(4)
        .filter_map(|(path, batch)| {
            future::ready(match batch {
                Ok(batch) => Some(batch),
                Err(e) => {
                    warn!("Skipping chunk {path:?}: {e:?}");
                    None
                }
            })
        })
        .collect::<Vec<_>>()
        .await;

    Ok(merge_measurements(batches, injected))
}

/// Concatenates batches in the given order, then `injected`, and sorts the result by timestamp.
/// The sort is stable, so measurements sharing a timestamp keep their merge order.
pub fn merge_measurements(
    batches: impl IntoIterator<Item = Batch>,
    injected: impl IntoIterator<Item = Measurement>,
) -> Vec<Measurement> {
    let mut measurements = batches
        .into_iter()
        .flat_map(|batch| batch.measurements)
        .chain(injected)
        .collect::<Vec<_>>();
    measurements.sort_by_key(|measurement| measurement.timestamp);
    measurements
}
