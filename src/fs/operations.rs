use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Replaces the whole content of `path` while holding an exclusive lock, so a reader holding a
/// shared lock never observes a half-written document.
pub async fn overwrite_locked(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await?;

    // Truncate only once the lock is held, another process may still be reading.
    file.lock_exclusive()?;
    let result = async {
        file.set_len(0).await?;
        file.seek(std::io::SeekFrom::Start(0)).await?;
        file.write_all(content).await?;
        file.sync_data().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;
    file.unlock_async().await?;
    Ok(result?)
}

/// Reads `path` under a shared lock. A missing file reads as `None`.
pub async fn read_locked(path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;
    let mut content = String::new();
    let result = file.read_to_string(&mut content).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(content))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_none() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(read_locked(&dir.path().join("absent.json")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn shorter_content_fully_replaces_longer() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.json");

        overwrite_locked(&path, b"{\"a\": 1234567890}").await?;
        overwrite_locked(&path, b"{}").await?;

        assert_eq!(read_locked(&path).await?.as_deref(), Some("{}"));
        Ok(())
    }
}
