//! Common types shared across the application.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Total length of a track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", tag = "kind", content = "seconds")]
pub enum TrackDuration {
    /// The resolver could not tell.
    #[default]
    Unknown,
    /// Known length in seconds.
    Finite(u64),
    /// Live streams and radio.
    Infinite,
}

impl TrackDuration {
    pub const fn from_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            Self::Unknown
        } else {
            Self::Finite(seconds)
        }
    }

    /// Seconds for finite durations.
    pub const fn as_seconds(&self) -> Option<u64> {
        match self {
            Self::Finite(secs) => Some(*secs),
            Self::Unknown | Self::Infinite => None,
        }
    }

    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// True when the duration is known and longer than `limit` seconds.
    pub const fn exceeds(&self, limit: u64) -> bool {
        match self {
            Self::Finite(secs) => *secs > limit,
            Self::Unknown | Self::Infinite => false,
        }
    }

    /// Format as MM:SS or HH:MM:SS.
    pub fn format(&self) -> String {
        let total_secs = match self {
            Self::Finite(secs) => *secs,
            Self::Unknown => return "?".to_string(),
            Self::Infinite => return "∞".to_string(),
        };
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

impl From<u64> for TrackDuration {
    fn from(seconds: u64) -> Self {
        Self::from_seconds(seconds)
    }
}

/// Output volume as a percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u16", into = "u16")]
pub struct Volume(u8);

impl Volume {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(100);
    pub const DEFAULT: Self = Self::MAX;

    /// Build a volume, rejecting anything above 100.
    pub fn new(percent: u16) -> Result<Self> {
        if percent > 100 {
            return Err(Error::InvalidVolume(percent));
        }
        Ok(Self(percent as u8))
    }

    pub const fn as_percentage(&self) -> u8 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u16> for Volume {
    type Error = Error;

    fn try_from(percent: u16) -> Result<Self> {
        Self::new(percent)
    }
}

impl From<Volume> for u16 {
    fn from(volume: Volume) -> Self {
        Self::from(volume.0)
    }
}

/// Identifier of a voice session (one per guild).
pub type SessionId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_format() {
        assert_eq!(TrackDuration::from_seconds(65).format(), "1:05");
        assert_eq!(TrackDuration::from_seconds(3661).format(), "1:01:01");
        assert_eq!(TrackDuration::Unknown.format(), "?");
        assert_eq!(TrackDuration::Infinite.format(), "∞");
    }

    #[test]
    fn test_duration_zero_is_unknown() {
        assert_eq!(TrackDuration::from_seconds(0), TrackDuration::Unknown);
        assert_eq!(TrackDuration::from(30).as_seconds(), Some(30));
    }

    #[test]
    fn test_duration_exceeds() {
        assert!(TrackDuration::Finite(600).exceeds(300));
        assert!(!TrackDuration::Finite(300).exceeds(300));
        assert!(!TrackDuration::Infinite.exceeds(1));
        assert!(!TrackDuration::Unknown.exceeds(1));
    }

    #[test]
    fn test_volume_bounds() {
        assert_eq!(Volume::new(0).map(|v| v.as_percentage()).ok(), Some(0));
        assert_eq!(Volume::new(100).map(|v| v.as_percentage()).ok(), Some(100));
        assert!(matches!(Volume::new(101), Err(Error::InvalidVolume(101))));
    }

    #[test]
    fn test_volume_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Volume>("50").is_ok());
        assert!(serde_json::from_str::<Volume>("250").is_err());
    }
}
