use std::path::{Path, PathBuf};

use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::stream::StreamData;

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("could not write metadata: {0}")]
    IoError(#[from] std::io::Error),
    #[error("could not serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Write the whole stream record as indented JSON to `<base>/<stem>.json`.
/// An existing file is never replaced.
pub async fn write(
    stream: &StreamData,
    base: &Path,
    stem: &str,
) -> Result<PathBuf, MetadataError> {
    let json = serde_json::to_string_pretty(stream)?;

    tokio::fs::create_dir_all(base).await?;
    let path = base.join(format!("{}.json", stem));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(json.as_bytes()).await?;
    file.flush().await?;

    Ok(path)
}
