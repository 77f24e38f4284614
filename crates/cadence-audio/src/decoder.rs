//! External decoder process that turns any source into raw PCM on stdout.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use cadence_core::{Error, PlayerConfig, Result, TrackSource};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::pcm::{CHANNELS, SAMPLE_RATE};

/// Placeholder replaced by the source in custom decoder arguments.
pub const URI_PLACEHOLDER: &str = "{uri}";

/// How to invoke the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderCommand {
    /// ffmpeg (or a compatible build) at `program`.
    Ffmpeg { program: PathBuf },
    /// Any program writing s16le stereo 48 kHz PCM to stdout.
    /// `{uri}` in `args` is replaced by the source.
    Custom { program: PathBuf, args: Vec<String> },
}

impl DecoderCommand {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::Ffmpeg {
            program: config.decoder_program(),
        }
    }

    pub fn program(&self) -> &Path {
        match self {
            Self::Ffmpeg { program } | Self::Custom { program, .. } => program,
        }
    }

    /// Arguments for decoding `source`.
    pub fn args(&self, source: &TrackSource) -> Vec<String> {
        let input = source.decoder_input();
        match self {
            Self::Ffmpeg { .. } => {
                let mut args = Vec::with_capacity(20);
                // Reconnect only makes sense for network streams
                if !source.is_local() {
                    args.extend(
                        [
                            "-reconnect",
                            "1",
                            "-reconnect_streamed",
                            "1",
                            "-reconnect_delay_max",
                            "5",
                        ]
                        .map(String::from),
                    );
                }
                args.extend(["-err_detect", "ignore_err", "-i"].map(String::from));
                args.push(input);
                args.extend(["-f", "s16le", "-ar"].map(String::from));
                args.push(SAMPLE_RATE.to_string());
                args.extend(["-vn", "-ac"].map(String::from));
                args.push(CHANNELS.to_string());
                args.extend(["pipe:1", "-loglevel", "error"].map(String::from));
                args
            }
            Self::Custom { args, .. } => args
                .iter()
                .map(|arg| arg.replace(URI_PLACEHOLDER, &input))
                .collect(),
        }
    }
}

/// A running decoder.
///
/// Dropping the handle kills the process if it is still running.
pub struct DecoderProcess {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    source: TrackSource,
}

impl DecoderProcess {
    /// Spawn the decoder for `source`. Must be called within a Tokio runtime.
    pub fn spawn(command: &DecoderCommand, source: &TrackSource) -> Result<Self> {
        let program = command.program();
        let args = command.args(source);
        debug!("Spawning decoder {} {:?}", program.display(), args);

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => Error::DecoderMissing(
                    format!("{} could not be executed: {e}", program.display()),
                ),
                _ => Error::DecoderSpawn(format!("Failed to spawn {}: {e}", program.display())),
            })?;

        let stdout = child.stdout.take();
        if stdout.is_none() {
            return Err(Error::DecoderSpawn(
                "Failed to capture decoder stdout".to_string(),
            ));
        }

        // Forward decoder diagnostics so a full stderr pipe never stalls it
        if let Some(stderr) = child.stderr.take() {
            let source = source.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("Decoder [{source}]: {line}");
                }
            });
        }

        info!(
            "Decoder started for {source} (pid {})",
            child.id().unwrap_or_default()
        );

        Ok(Self {
            child: Some(child),
            stdout,
            source: source.clone(),
        })
    }

    /// Take the PCM output stream. Returns `None` after the first call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// OS process id, while the process is running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Close the output, give the process `grace` to exit, then kill it.
    ///
    /// Never fails: a process that already exited is simply reaped.
    pub async fn shutdown(mut self, grace: Duration) {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return;
        };

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!("Decoder for {} exited: {status}", self.source),
            Ok(Err(e)) => warn!("Failed to wait for decoder of {}: {e}", self.source),
            Err(_) => {
                debug!(
                    "Decoder for {} still running after {:?}, killing",
                    self.source, grace
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill decoder of {}: {e}", self.source);
                }
            }
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            // Already-exited processes report an error here; nothing to do then
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg() -> DecoderCommand {
        DecoderCommand::Ffmpeg {
            program: PathBuf::from("ffmpeg"),
        }
    }

    #[test]
    fn test_ffmpeg_args_for_local_file() {
        let args = ffmpeg().args(&TrackSource::new("/music/song.flac"));
        assert_eq!(
            args,
            [
                "-err_detect",
                "ignore_err",
                "-i",
                "/music/song.flac",
                "-f",
                "s16le",
                "-ar",
                "48000",
                "-vn",
                "-ac",
                "2",
                "pipe:1",
                "-loglevel",
                "error"
            ]
        );
    }

    #[test]
    fn test_ffmpeg_args_for_remote_stream() {
        let args = ffmpeg().args(&TrackSource::new("https://cdn.example.com/a.webm"));
        assert_eq!(
            &args[..6],
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5"
            ]
        );
        assert_eq!(args[9], "https://cdn.example.com/a.webm");
        assert_eq!(args.len(), 20);
    }

    #[test]
    fn test_custom_args_substitute_uri() {
        let command = DecoderCommand::Custom {
            program: PathBuf::from("cat"),
            args: vec!["--".to_string(), "{uri}".to_string()],
        };
        assert_eq!(
            command.args(&TrackSource::new("file:///tmp/a.pcm")),
            ["--", "/tmp/a.pcm"]
        );
        assert_eq!(command.program(), Path::new("cat"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_config_error() {
        let command = DecoderCommand::Ffmpeg {
            program: PathBuf::from("/nonexistent/cadence-test-decoder"),
        };
        let result = DecoderProcess::spawn(&command, &TrackSource::new("/tmp/a.mp3"));
        assert!(matches!(result, Err(Error::DecoderMissing(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_stdout_and_shuts_down() {
        use std::io::Write;
        use tokio::io::AsyncReadExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 1000]).unwrap();
        let source = TrackSource::new(file.path().display().to_string());

        let command = DecoderCommand::Custom {
            program: PathBuf::from("cat"),
            args: vec![URI_PLACEHOLDER.to_string()],
        };
        let mut process = DecoderProcess::spawn(&command, &source).unwrap();
        let mut stdout = process.take_stdout().unwrap();
        assert!(process.take_stdout().is_none());

        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, vec![7u8; 1000]);

        process.shutdown(Duration::from_secs(1)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_kills_unresponsive_process() {
        let command = DecoderCommand::Custom {
            program: PathBuf::from("sleep"),
            args: vec!["30".to_string()],
        };
        let process = DecoderProcess::spawn(&command, &TrackSource::new("ignored")).unwrap();
        assert!(process.id().is_some());

        let started = std::time::Instant::now();
        process.shutdown(Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
