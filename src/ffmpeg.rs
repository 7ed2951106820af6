use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Child};

use crate::{api::ORIGIN, shutdown::Shutdown};

/// How long ffmpeg gets to finalize the container after `q` before it is
/// killed.
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum FfmpegError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("ffmpeg exited with {0}")]
    Exit(ExitStatus),
    #[error("recording interrupted")]
    Interrupted,
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Credentials ffmpeg needs to pull the playback URL.
#[derive(Debug, Clone)]
pub struct Session<'a> {
    pub token: &'a str,
    pub user_agent: &'a str,
}

#[async_trait]
pub trait Recorder {
    /// Capture `playback_url` into `output`, returning once the capture ends.
    async fn record(
        &self,
        playback_url: &str,
        session: &Session<'_>,
        output: &Path,
    ) -> Result<(), FfmpegError>;
}

/// Stream-copies the live playlist into a container with the ffmpeg CLI.
pub struct Ffmpeg {
    pub program: PathBuf,
    /// Stop the capture gracefully after this long.
    pub max_duration: Option<Duration>,
    /// Stop the capture gracefully and report [`FfmpegError::Interrupted`].
    pub shutdown: Shutdown,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            max_duration: None,
            shutdown: Shutdown::default(),
        }
    }
}

pub fn build_args(playback_url: &str, session: &Session<'_>, output: &Path) -> Vec<OsString> {
    let headers = format!(
        "Authorization: {}\r\nReferer: {}\r\n",
        session.token, ORIGIN
    );

    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-v",
        "warning",
        "-stats",
        "-http_persistent",
        "0",
        "-user_agent",
        session.user_agent,
        // ffmpeg only keeps the last -headers, so both go in one value
        "-headers",
        headers.as_str(),
        "-i",
        playback_url,
        "-c",
        "copy",
        "-n",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(output.as_os_str().to_owned());

    args
}

/// Ask ffmpeg to finish writing the container, then wait for it. Kills it if
/// it is still running after [`STOP_GRACE`].
async fn stop(child: &mut Child) -> Result<ExitStatus, FfmpegError> {
    if let Some(mut stdin) = child.stdin.take() {
        // Fails if ffmpeg is already on its way out, e.g. after its own SIGINT
        if let Err(e) = stdin.write_all(b"q").await {
            debug!("Could not send q to ffmpeg: {}", e);
        }
    }

    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!("ffmpeg did not stop in time, killing it");
            child.start_kill()?;
            Ok(child.wait().await?)
        }
    }
}

#[async_trait]
impl Recorder for Ffmpeg {
    async fn record(
        &self,
        playback_url: &str,
        session: &Session<'_>,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(build_args(playback_url, session, output))
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FfmpegError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let deadline = async {
            match self.max_duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = deadline => {
                info!("Maximum recording duration reached, stopping ffmpeg");
                // A capped recording is still a complete file
                stop(&mut child).await?;
                return Ok(());
            }
            _ = self.shutdown.requested() => {
                warn!("Interrupted, waiting for ffmpeg to finalize {}", output.display());
                stop(&mut child).await?;
                return Err(FfmpegError::Interrupted);
            }
        };

        if !status.success() {
            return Err(FfmpegError::Exit(status));
        }

        Ok(())
    }
}
