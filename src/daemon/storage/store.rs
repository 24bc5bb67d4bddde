use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::utils::clock::Clock;

use super::{
    chunk_storage::{ChunkFileHandle, ChunkStorage},
    entities::{Batch, Measurement},
};

/// Chunks are rotated after being open for this long.
pub const DEFAULT_ROTATION: Duration = Duration::hours(1);

/// Destination of the measurements produced by the sampler.
pub trait MeasurementSink {
    /// Persists a measurement. On failure the measurement must stay pending so a later call can
    /// still save it.
    fn record(&mut self, measurement: Measurement) -> impl Future<Output = Result<()>>;

    /// Persists whatever is still pending. Called once before the daemon exits.
    fn finalize(&mut self) -> impl Future<Output = Result<()>>;
}

struct OpenChunk<F> {
    file: F,
    opened: DateTime<Utc>,
}

/// Accumulates measurements into a pending [Batch] and writes the whole batch into the current
/// chunk on every flush.
///
/// Rewriting the full batch means a crash loses at most the measurement being written. A failed
/// write moves the batch into a new chunk, so the old chunk may hold a prefix of the same
/// measurements. Readers have to tolerate those duplicates.
pub struct MeasurementStore<S: ChunkStorage> {
    storage: S,
    pending: Batch,
    current: Option<OpenChunk<S::ChunkFile>>,
    rotation: Duration,
    clock: Box<dyn Clock>,
}

impl<S: ChunkStorage> MeasurementStore<S> {
    pub fn new(
        storage: S,
        sampling_interval_seconds: u32,
        timezone_identifier: impl Into<String>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            pending: Batch::new(sampling_interval_seconds, timezone_identifier),
            current: None,
            rotation: DEFAULT_ROTATION,
            clock,
        }
    }

    pub fn with_rotation(self, rotation: Duration) -> Self {
        Self { rotation, ..self }
    }

    /// Adds a measurement to the pending batch. Nothing is written until [Self::flush].
    pub fn append(&mut self, measurement: Measurement) {
        self.pending.measurements.push(measurement);
    }

    pub fn pending(&self) -> &Batch {
        &self.pending
    }

    /// Name of the chunk flushes currently go to.
    pub fn current_chunk(&self) -> Option<&str> {
        self.current.as_ref().map(|open| open.file.name())
    }

    /// Writes the pending batch into the current chunk, opening one if necessary.
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let now = self.clock.time();
        match self.current.as_mut() {
            None => {
                let file = write_new_chunk(&self.storage, &self.pending, now).await?;
                info!(
                    "Flushed {} measurements to new chunk {}",
                    self.pending.measurements.len(),
                    file.name()
                );
                self.current = Some(OpenChunk { file, opened: now });
            }
            Some(open) => {
                if let Err(e) = open.file.write_batch(&self.pending).await {
                    warn!(
                        "Failed to write chunk {}, retrying with a new chunk: {e:?}",
                        open.file.name()
                    );
                    let file = write_new_chunk(&self.storage, &self.pending, now).await?;
                    // The rotation window keeps counting from the failed chunk since the
                    // pending batch still starts there.
                    open.file = file;
                }
                info!(
                    "Flushed {} measurements to {}",
                    self.pending.measurements.len(),
                    open.file.name()
                );
            }
        }

        self.rotate_if_expired(now);
        Ok(())
    }

    fn rotate_if_expired(&mut self, now: DateTime<Utc>) {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|open| now - open.opened > self.rotation);

        if expired {
            if let Some(open) = self.current.take() {
                info!("Rotating chunk {}", open.file.name());
            }
            self.pending.measurements.clear();
        }
    }
}

/// Creates a chunk holding `batch`. A chunk whose first write fails is removed again, so failing
/// flushes don't leave empty chunks behind.
async fn write_new_chunk<S: ChunkStorage>(
    storage: &S,
    batch: &Batch,
    created: DateTime<Utc>,
) -> Result<S::ChunkFile> {
    let mut file = storage.create_chunk(created).await?;
    if let Err(e) = file.write_batch(batch).await {
        let name = file.name().to_string();
        if let Err(discard_error) = file.discard().await {
            warn!("Failed to remove empty chunk {name} {discard_error:?}");
        }
        return Err(e);
    }
    Ok(file)
}

impl<S: ChunkStorage> MeasurementSink for MeasurementStore<S> {
    async fn record(&mut self, measurement: Measurement) -> Result<()> {
        self.append(measurement);
        self.flush().await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use anyhow::{bail, Result};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::{
            chunk_storage::{ChunkDirectory, ChunkFile, ChunkFileHandle, ChunkStorage},
            entities::{Batch, Measurement},
        },
        utils::clock::test_clocks::ManualClock,
    };

    use super::{MeasurementSink, MeasurementStore};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 21, 8, 0, 0).unwrap()
    }

    fn samples(count: i64) -> Vec<Measurement> {
        (0..count)
            .map(|i| Measurement::sample(start() + Duration::minutes(i), i as u32))
            .collect()
    }

    fn store_in(dir: &Path, clock: &ManualClock) -> MeasurementStore<ChunkDirectory> {
        MeasurementStore::new(
            ChunkDirectory::new(dir.to_path_buf()),
            60,
            "Europe/Stockholm",
            Box::new(clock.clone()),
        )
    }

    async fn read_all(storage: &impl ChunkStorage) -> Result<Vec<Batch>> {
        let mut batches = vec![];
        for path in storage.discover_chunks().await? {
            batches.push(storage.read_chunk(&path).await?);
        }
        Ok(batches)
    }

    #[tokio::test]
    async fn test_flush_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = store_in(dir.path(), &clock);

        for measurement in samples(3) {
            store.append(measurement);
        }
        store.flush().await?;

        let batches = read_all(&ChunkDirectory::new(dir.path().to_path_buf())).await?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].measurements, samples(3));
        assert_eq!(batches[0].sampling_interval_seconds, 60);
        assert_eq!(batches[0].timezone_identifier, "Europe/Stockholm");
        Ok(())
    }

    #[tokio::test]
    async fn test_flushes_rewrite_the_current_chunk() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = store_in(dir.path(), &clock);

        for measurement in samples(5) {
            clock.advance(Duration::minutes(1));
            store.record(measurement).await?;
        }

        let batches = read_all(&ChunkDirectory::new(dir.path().to_path_buf())).await?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].measurements, samples(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_flush_creates_nothing() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = store_in(&dir.path().join("measurements"), &clock);

        store.flush().await?;

        assert!(store.current_chunk().is_none());
        assert!(!dir.path().join("measurements").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_rotation_starts_a_new_chunk() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = store_in(dir.path(), &clock);
        let measurements = samples(3);

        store.record(measurements[0].clone()).await?;
        clock.advance(Duration::minutes(30));
        store.record(measurements[1].clone()).await?;
        assert!(store.current_chunk().is_some());

        clock.advance(Duration::minutes(31));
        store.record(measurements[2].clone()).await?;
        // Flushed into the old chunk, then rotated.
        assert!(store.current_chunk().is_none());
        assert!(store.pending().is_empty());

        clock.advance(Duration::minutes(1));
        let late = Measurement::sample(start() + Duration::minutes(62), 0);
        store.record(late.clone()).await?;

        let batches = read_all(&ChunkDirectory::new(dir.path().to_path_buf())).await?;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].measurements, measurements);
        assert_eq!(batches[1].measurements, vec![late]);
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_failure_keeps_measurements_pending() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file where a directory should be")?;
        let clock = ManualClock::new(start());
        let mut store = store_in(&blocker.join("measurements"), &clock);

        assert!(store.record(samples(1)[0].clone()).await.is_err());

        assert_eq!(store.pending().measurements, samples(1));
        assert!(store.current_chunk().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_final_flush_saves_measurement_that_failed_earlier() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file where a directory should be")?;
        let clock = ManualClock::new(start());
        let mut store = store_in(&blocker.join("measurements"), &clock);

        assert!(store.record(samples(1)[0].clone()).await.is_err());
        std::fs::remove_file(&blocker)?;
        store.finalize().await?;

        let batches = read_all(&ChunkDirectory::new(blocker.join("measurements"))).await?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].measurements, samples(1));
        Ok(())
    }

    /// Chunk that stops accepting writes after a number of successful ones.
    struct FlakyChunk {
        inner: ChunkFile,
        writes: usize,
        limit: Option<usize>,
    }

    impl ChunkFileHandle for FlakyChunk {
        async fn write_batch(&mut self, batch: &Batch) -> Result<()> {
            if self.limit.is_some_and(|limit| self.writes >= limit) {
                bail!("No space left on device");
            }
            self.writes += 1;
            self.inner.write_batch(batch).await
        }

        async fn discard(self) -> Result<()> {
            self.inner.discard().await
        }

        fn name(&self) -> &str {
            self.inner.name()
        }
    }

    /// Only the first chunk created is flaky.
    struct FlakyStorage {
        inner: ChunkDirectory,
        created: AtomicUsize,
        healthy_writes: usize,
    }

    impl ChunkStorage for FlakyStorage {
        type ChunkFile = FlakyChunk;

        async fn create_chunk(&self, created: DateTime<Utc>) -> Result<FlakyChunk> {
            let first = self.created.fetch_add(1, Ordering::SeqCst) == 0;
            Ok(FlakyChunk {
                inner: self.inner.create_chunk(created).await?,
                writes: 0,
                limit: first.then_some(self.healthy_writes),
            })
        }

        async fn discover_chunks(&self) -> Result<Vec<PathBuf>> {
            self.inner.discover_chunks().await
        }

        async fn read_chunk(&self, path: &Path) -> Result<Batch> {
            self.inner.read_chunk(path).await
        }
    }

    #[tokio::test]
    async fn test_failed_write_moves_batch_to_new_chunk() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = MeasurementStore::new(
            FlakyStorage {
                inner: ChunkDirectory::new(dir.path().to_path_buf()),
                created: AtomicUsize::new(0),
                healthy_writes: 1,
            },
            60,
            "UTC",
            Box::new(clock.clone()),
        );
        let measurements = samples(3);

        store.record(measurements[0].clone()).await?;
        let first_chunk = store.current_chunk().map(str::to_string);

        store.record(measurements[1].clone()).await?;
        assert_ne!(store.current_chunk().map(str::to_string), first_chunk);

        store.record(measurements[2].clone()).await?;

        let batches = read_all(&ChunkDirectory::new(dir.path().to_path_buf())).await?;
        assert_eq!(batches.len(), 2);
        // The old chunk keeps what it had, the new chunk holds everything.
        assert_eq!(batches[0].measurements, measurements[..1].to_vec());
        assert_eq!(batches[1].measurements, measurements);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_first_write_leaves_no_empty_chunk() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = MeasurementStore::new(
            FlakyStorage {
                inner: ChunkDirectory::new(dir.path().to_path_buf()),
                created: AtomicUsize::new(0),
                healthy_writes: 0,
            },
            60,
            "UTC",
            Box::new(clock.clone()),
        );
        let measurements = samples(2);

        assert!(store.record(measurements[0].clone()).await.is_err());
        let storage = ChunkDirectory::new(dir.path().to_path_buf());
        assert!(storage.discover_chunks().await?.is_empty());
        assert!(store.current_chunk().is_none());

        clock.advance(Duration::minutes(1));
        store.record(measurements[1].clone()).await?;

        let batches = read_all(&storage).await?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].measurements, measurements);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_retry_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(start());
        let mut store = MeasurementStore::new(
            FlakyStorage {
                inner: ChunkDirectory::new(dir.path().to_path_buf()),
                created: AtomicUsize::new(0),
                healthy_writes: 1,
            },
            60,
            "UTC",
            Box::new(clock.clone()),
        );
        let measurements = samples(2);
        store.record(measurements[0].clone()).await?;

        std::fs::remove_dir_all(dir.path())?;
        std::fs::write(dir.path(), "")?;

        assert!(store.record(measurements[1].clone()).await.is_err());
        assert_eq!(store.pending().measurements, measurements);

        std::fs::remove_file(dir.path())?;
        Ok(())
    }
}
