//! Command-line options.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cadence_core::{Platform, RepeatMode, Track, TrackSource};

pub const USAGE: &str = "usage: cadence [--config <file>] [--volume <0-100>] \
[--repeat off|track|queue] [--fair] <uri>...";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub volume: Option<u16>,
    pub repeat: RepeatMode,
    pub fair_play: bool,
    pub sources: Vec<String>,
}

impl Options {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a file")?;
                    options.config = Some(PathBuf::from(path));
                }
                "--volume" => {
                    let value = args.next().context("--volume needs a value")?;
                    options.volume = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid volume: {value}"))?,
                    );
                }
                "--repeat" => {
                    let value = args.next().context("--repeat needs a mode")?;
                    options.repeat = parse_repeat(&value)?;
                }
                "--fair" => options.fair_play = true,
                flag if flag.starts_with("--") => bail!("Unknown option {flag}\n{USAGE}"),
                _ => options.sources.push(arg),
            }
        }

        if options.sources.is_empty() {
            bail!("No sources given\n{USAGE}");
        }
        Ok(options)
    }
}

fn parse_repeat(value: &str) -> Result<RepeatMode> {
    Ok(match value {
        "off" => RepeatMode::Off,
        "track" => RepeatMode::Track,
        "queue" => RepeatMode::Queue,
        other => bail!("Unknown repeat mode {other}"),
    })
}

/// Build a track for a command-line source, titled after its file name.
pub fn track_for(uri: &str) -> Track {
    let source = TrackSource::new(uri);
    let title = uri
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(uri)
        .to_string();
    let platform = if source.is_local() {
        Platform::Local
    } else {
        Platform::Other
    };
    Track::new(title, source).with_platform(platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_options() {
        let options = Options::parse(args(&[
            "--volume", "40", "--repeat", "queue", "a.mp3", "--fair", "b.mp3",
        ]))
        .unwrap();
        assert_eq!(options.volume, Some(40));
        assert_eq!(options.repeat, RepeatMode::Queue);
        assert!(options.fair_play);
        assert_eq!(options.sources, ["a.mp3", "b.mp3"]);
        assert!(options.config.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Options::parse(args(&[])).is_err());
        assert!(Options::parse(args(&["--volume"])).is_err());
        assert!(Options::parse(args(&["--volume", "loud", "a.mp3"])).is_err());
        assert!(Options::parse(args(&["--repeat", "forever", "a.mp3"])).is_err());
        assert!(Options::parse(args(&["--shuffle", "a.mp3"])).is_err());
    }

    #[test]
    fn test_track_titles() {
        let local = track_for("/music/album/song.flac");
        assert_eq!(local.title, "song.flac");
        assert_eq!(local.platform, Platform::Local);

        let remote = track_for("https://radio.example.com/stream/");
        assert_eq!(remote.title, "stream");
        assert_eq!(remote.platform, Platform::Other);
    }
}
