use std::path::Path;

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Replaces the whole content of a file with `data`, creating the file if necessary. An exclusive
/// lock is held for the duration of the write so a cooperating reader never observes a half
/// written file.
pub async fn overwrite_locked(path: &Path, data: &[u8]) -> Result<(), io::Error> {
    let mut file = File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = overwrite(&mut file, data).await;
    file.unlock_async().await?;
    result
}

async fn overwrite(file: &mut File, data: &[u8]) -> Result<(), io::Error> {
    file.set_len(0).await?;
    file.rewind().await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Reads a whole file while holding a shared lock on it.
pub async fn read_locked(path: &Path) -> Result<Vec<u8>, io::Error> {
    let mut file = File::open(path).await?;
    file.lock_shared()?;
    let mut buffer = vec![];
    let result = file.read_to_end(&mut buffer).await;
    file.unlock_async().await?;
    result.map(|_| buffer)
}
