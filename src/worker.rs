use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::sync::Mutex;
use tokio_retry::RetryIf;

use crate::{
    api::{ApiError, FanslyClient},
    config::Config,
    ffmpeg::{FfmpegError, Recorder, Session},
    metadata, retry,
    shutdown::Shutdown,
    stream::format_start_in,
    util,
};

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("Error talking to the Fansly API: {0}")]
    Api(#[from] ApiError),
    #[error("{0} is not streaming right now")]
    NotLive(String),
    #[error("Error downloading stream: {0}")]
    Recording(#[from] FfmpegError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Interrupted")]
    Interrupted,
}

impl WorkerError {
    /// Whether another attempt of the whole sequence may succeed. Offline
    /// creators, rejected credentials and a missing ffmpeg are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Api(e) => e.is_transient(),
            WorkerError::NotLive(_) => false,
            WorkerError::Recording(e) => match e {
                FfmpegError::Exit(_) | FfmpegError::IoError(_) => true,
                FfmpegError::Spawn { .. } | FfmpegError::Interrupted => false,
            },
            WorkerError::IoError(_) | WorkerError::Interrupted => false,
        }
    }
}

/// Files produced by a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub video: PathBuf,
    pub metadata: Option<PathBuf>,
}

/// First of `<stem>.<ext>`, `<stem>_1.<ext>`, ... that does not exist yet.
pub async fn unique_path(dir: &Path, stem: &str, ext: &str) -> std::io::Result<PathBuf> {
    let mut path = dir.join(format!("{}.{}", stem, ext));
    let mut n = 1;

    while tokio::fs::try_exists(&path).await? {
        path = dir.join(format!("{}_{}.{}", stem, n, ext));
        n += 1;
    }

    Ok(path)
}

/// Look up the creator, record their stream and optionally save its metadata,
/// once. `recording` is held from the start of the capture until the metadata
/// is written.
async fn attempt<R>(
    client: &FanslyClient,
    recorder: &R,
    config: &Config,
    recording: &Mutex<()>,
) -> Result<Recording, WorkerError>
where
    R: Recorder + ?Sized,
{
    info!("Fetching account data for creator: {}", config.creator);
    let account = client.fetch_account(&config.creator).await?;
    debug!("Found account {} ({})", account.id, account.username);

    let stream = client.fetch_stream(&account.id).await?;
    if !stream.is_accessible() {
        debug!("Stream is not accessible or no stream data available");
    }
    let playback_url = stream
        .live_playback_url()
        .ok_or_else(|| WorkerError::NotLive(config.creator.clone()))?;

    let start = match stream.started_at() {
        Some(millis) => format_start_in(millis, &Local),
        None => {
            warn!("Stream has no start time, naming the recording after the current time");
            format_start_in(chrono::Utc::now().timestamp_millis(), &Local)
        }
    };
    let dir = config.recording_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let video = unique_path(&dir, &start, "mp4").await?;
    // Metadata shares the `_N` suffix so it never replaces an earlier file
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(start);

    let _recording = recording.lock().await;

    info!("Recording {} to {}", config.creator, video.display());
    let session = Session {
        token: &config.token,
        user_agent: &config.user_agent,
    };
    recorder.record(playback_url, &session, &video).await?;

    match tokio::fs::metadata(&video).await {
        Ok(meta) => info!(
            "Stream downloaded successfully ({})",
            util::format_bytes(meta.len())
        ),
        Err(_) => info!("Stream downloaded successfully"),
    }

    let metadata = if config.metadata {
        match metadata::write(&stream, &config.base_path, &stem).await {
            Ok(path) => {
                info!("Saved metadata to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(Recording { video, metadata })
}

/// Look up the creator and record their stream, retrying transient failures
/// with a linear backoff.
///
/// With `config.wait` set, an offline creator is polled every
/// `config.poll_interval` instead of ending the run.
///
/// Once `shutdown` is requested, API calls and waits are abandoned right away.
/// A capture in progress is left to the recorder, which is expected to watch
/// the same flag and finalize its output first.
pub async fn run<R>(
    client: &FanslyClient,
    recorder: &R,
    config: &Config,
    shutdown: &Shutdown,
) -> Result<Recording, WorkerError>
where
    R: Recorder + ?Sized,
{
    let recording = Mutex::new(());

    loop {
        let strategy = retry::schedule(config.retry_delay, config.attempts)
            .inspect(|delay| info!("Retrying in {:.1} seconds", delay.as_secs_f32()));

        let retried = RetryIf::spawn(
            strategy,
            || attempt(client, recorder, config, &recording),
            |e: &WorkerError| {
                let transient = e.is_transient() && !shutdown.is_requested();
                if transient {
                    warn!("{}", e);
                }
                transient
            },
        );

        let result = tokio::select! {
            biased;
            result = retried => result,
            _ = async {
                shutdown.requested().await;
                // Not while a capture is being finalized
                recording.lock().await
            } => Err(WorkerError::Interrupted),
        };

        match result {
            Err(WorkerError::Recording(FfmpegError::Interrupted)) => {
                return Err(WorkerError::Interrupted);
            }
            Err(WorkerError::NotLive(creator)) if config.wait => {
                info!(
                    "{} is not streaming right now, checking again in {} seconds",
                    creator,
                    config.poll_interval.as_secs()
                );
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown.requested() => return Err(WorkerError::Interrupted),
                }
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "2023-11-14_22:13:20", "mp4")
            .await
            .unwrap();
        assert_eq!(first, dir.path().join("2023-11-14_22:13:20.mp4"));

        std::fs::write(&first, b"").unwrap();
        let second = unique_path(dir.path(), "2023-11-14_22:13:20", "mp4")
            .await
            .unwrap();
        assert_eq!(second, dir.path().join("2023-11-14_22:13:20_1.mp4"));

        std::fs::write(&second, b"").unwrap();
        let third = unique_path(dir.path(), "2023-11-14_22:13:20", "mp4")
            .await
            .unwrap();
        assert_eq!(third, dir.path().join("2023-11-14_22:13:20_2.mp4"));
    }

    #[tokio::test]
    async fn unique_path_reports_unreadable_dir() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be: lookups fail with
        // ENOTDIR instead of reporting "does not exist"
        let not_a_dir = dir.path().join("file");
        std::fs::write(&not_a_dir, b"").unwrap();

        let result = unique_path(&not_a_dir, "2023-11-14_22:13:20", "mp4").await;
        assert!(result.is_err(), "{:?}", result);
    }

    #[test]
    fn classification() {
        assert!(!WorkerError::NotLive("alice".into()).is_transient());
        assert!(!WorkerError::Recording(FfmpegError::Interrupted).is_transient());
        assert!(!WorkerError::Api(ApiError::NotFound("alice".into())).is_transient());

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(WorkerError::Recording(FfmpegError::IoError(io)).is_transient());
    }
}
