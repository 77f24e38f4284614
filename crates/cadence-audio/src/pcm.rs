//! Raw PCM format produced by the decoder and consumed by the output sink.

use std::time::Duration;

use cadence_core::Volume;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Interleaved stereo.
pub const CHANNELS: u16 = 2;

/// Signed 16-bit little-endian samples.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes of PCM per second of audio.
pub const BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * CHANNELS as usize * BYTES_PER_SAMPLE;

/// How long `bytes` of PCM take to play.
pub fn playback_duration(bytes: usize) -> Duration {
    Duration::from_micros((bytes as u64 * 1_000_000) / BYTES_PER_SECOND as u64)
}

/// Scale s16le samples in place.
///
/// A trailing odd byte is left untouched.
pub fn apply_volume(pcm: &mut [u8], volume: Volume) {
    let percent = i32::from(volume.as_percentage());
    if percent == 100 {
        return;
    }
    if percent == 0 {
        pcm.fill(0);
        return;
    }

    for sample in pcm.chunks_exact_mut(BYTES_PER_SAMPLE) {
        let value = i32::from(i16::from_le_bytes([sample[0], sample[1]]));
        let scaled = (value * percent / 100) as i16;
        sample.copy_from_slice(&scaled.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_bytes_per_second() {
        assert_eq!(BYTES_PER_SECOND, 192_000);
        assert_eq!(playback_duration(3_840), Duration::from_millis(20));
        assert_eq!(playback_duration(38_400), Duration::from_millis(200));
    }

    #[test]
    fn test_full_volume_is_untouched() {
        let mut pcm = samples(&[1000, -1000, i16::MAX, i16::MIN]);
        let before = pcm.clone();
        apply_volume(&mut pcm, Volume::MAX);
        assert_eq!(pcm, before);
    }

    #[test]
    fn test_half_volume() {
        let mut pcm = samples(&[1000, -1000, i16::MAX, i16::MIN]);
        apply_volume(&mut pcm, Volume::new(50).unwrap_or_default());
        assert_eq!(pcm, samples(&[500, -500, 16383, -16384]));
    }

    #[test]
    fn test_mute() {
        let mut pcm = samples(&[1234, -4321]);
        apply_volume(&mut pcm, Volume::MIN);
        assert_eq!(pcm, vec![0; 4]);
    }

    #[test]
    fn test_odd_trailing_byte() {
        let mut pcm = samples(&[200]);
        pcm.push(0x7f);
        apply_volume(&mut pcm, Volume::new(10).unwrap_or_default());
        assert_eq!(pcm, vec![20, 0, 0x7f]);
    }
}
