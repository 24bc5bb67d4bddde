use std::{
    future::{self, Future},
    io::{self, ErrorKind},
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, instrument, warn};

use crate::{
    fs::operations::{overwrite_locked, read_locked},
    utils::time::datetime_to_chunk_name,
};

use super::entities::Batch;

const CHUNK_EXTENSION: &str = "json";

/// Upper bound on suffixed names tried for chunks created within the same second.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Interface for abstracting the directory of chunk files.
pub trait ChunkStorage {
    type ChunkFile: ChunkFileHandle;

    /// Creates a brand-new chunk file. Never hands out a file that already existed, so a retry
    /// can't clobber the chunk whose write just failed.
    fn create_chunk(
        &self,
        created: DateTime<Utc>,
    ) -> impl Future<Output = Result<Self::ChunkFile>>;

    /// Lists all chunk files in a stable order. A missing directory simply has no chunks.
    fn discover_chunks(&self) -> impl Future<Output = Result<Vec<PathBuf>>> + Send;

    /// Reads and decodes a single chunk file.
    fn read_chunk(&self, path: &Path) -> impl Future<Output = Result<Batch>> + Send;
}

impl<T: Deref> ChunkStorage for T
where
    T::Target: ChunkStorage,
{
    type ChunkFile = <T::Target as ChunkStorage>::ChunkFile;

    fn create_chunk(
        &self,
        created: DateTime<Utc>,
    ) -> impl Future<Output = Result<Self::ChunkFile>> {
        self.deref().create_chunk(created)
    }

    fn discover_chunks(&self) -> impl Future<Output = Result<Vec<PathBuf>>> + Send {
        self.deref().discover_chunks()
    }

    fn read_chunk(&self, path: &Path) -> impl Future<Output = Result<Batch>> + Send {
        self.deref().read_chunk(path)
    }
}

pub trait ChunkFileHandle {
    /// Replaces the content of the chunk with `batch`.
    fn write_batch(&mut self, batch: &Batch) -> impl Future<Output = Result<()>>;

    /// Removes a chunk that never received a batch.
    fn discard(self) -> impl Future<Output = Result<()>>;

    fn name(&self) -> &str;
}

/// The main realization of [ChunkStorage]. Chunk files are json documents named after their
/// creation time.
pub struct ChunkDirectory {
    dir: PathBuf,
}

impl ChunkDirectory {
    /// Doesn't touch the disk. The directory is created together with the first chunk.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_name(base: &str, attempt: u32) -> String {
        // `_` sorts after `.`, so a suffixed chunk is discovered after the one it follows.
        if attempt == 0 {
            format!("{base}.{CHUNK_EXTENSION}")
        } else {
            format!("{base}_{attempt:02}.{CHUNK_EXTENSION}")
        }
    }
}

impl ChunkStorage for ChunkDirectory {
    type ChunkFile = ChunkFile;

    #[instrument(skip(self))]
    async fn create_chunk(&self, created: DateTime<Utc>) -> Result<ChunkFile> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create chunk directory {:?}", self.dir))?;

        let base = datetime_to_chunk_name(created);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = Self::chunk_name(&base, attempt);
            let path = self.dir.join(&name);
            match File::options()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    debug!("Created chunk {path:?}");
                    return Ok(ChunkFile { path, name });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create chunk {path:?}"));
                }
            }
        }

        Err(anyhow!("No free chunk name left for {base}"))
    }

    async fn discover_chunks(&self) -> Result<Vec<PathBuf>> {
        let entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Chunk directory {:?} doesn't exist yet", self.dir);
                return Ok(vec![]);
            }
            Err(e) => Err(e)?,
        };

        let paths = ReadDirStream::new(entries).map_ok(|entry| entry.path());
        Ok(chunk_paths(paths).await)
    }

    async fn read_chunk(&self, path: &Path) -> Result<Batch> {
        let data = read_locked(path).await?;
        let batch = serde_json::from_slice::<Batch>(&data)
            .with_context(|| format!("Chunk {path:?} couldn't be decoded"))?;
        Ok(batch)
    }
}

/// Keeps the chunk files among `paths`, sorted. An entry that can't be read is skipped so one bad
/// entry doesn't hide every other chunk.
async fn chunk_paths(paths: impl Stream<Item = io::Result<PathBuf>>) -> Vec<PathBuf> {
    let mut chunks = paths
        .filter_map(|path| {
            future::ready(match path {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Skipping unreadable directory entry {e:?}");
                    None
                }
            })
        })
        .filter(|path| {
            future::ready(path.extension().is_some_and(|extension| extension == CHUNK_EXTENSION))
        })
        .collect::<Vec<_>>()
        .await;

    chunks.sort();
    chunks
}

/// Chunk file inside a [ChunkDirectory]. The file is reopened for every write, which keeps no
/// descriptor alive between flushes.
pub struct ChunkFile {
    path: PathBuf,
    name: String,
}

impl ChunkFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkFileHandle for ChunkFile {
    async fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let data = serde_json::to_vec(batch)?;
        overwrite_locked(&self.path, &data)
            .await
            .with_context(|| format!("Failed to write chunk {:?}", self.path))?;
        Ok(())
    }

    async fn discard(self) -> Result<()> {
        tokio::fs::remove_file(&self.path)
            .await
            .with_context(|| format!("Failed to remove chunk {:?}", self.path))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
