// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decodes arbitrary audio containers (WAV, MP3, FLAC, Ogg, ...) held in memory
//! into a [`PcmBuffer`].

use std::io::Cursor;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::PcmBuffer;
use super::error::DecodeError;

/// Decodes a complete audio file held in memory. The `extension` is only a
/// hint for the format probe; content sniffing still applies.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params.sample_rate.ok_or(DecodeError::NoSampleRate)?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    // Channel count from metadata when present, otherwise from the first
    // decoded packet.
    let mut planar: Vec<Vec<f32>> = match params.channels {
        Some(channels) => vec![Vec::new(); channels.count()],
        None => Vec::new(),
    };

    while let Some(packet) = read_next_packet(format_reader.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                match decoder.decode(&packet) {
                    Ok(decoded) => decoded,
                    Err(e) => return Err(e.into()),
                }
            }
            // A corrupt packet mid-stream is skipped rather than failing the load.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        append_planar(&mut planar, decoded);
    }

    if planar.is_empty() || planar[0].is_empty() {
        return Err(DecodeError::Empty);
    }

    PcmBuffer::from_planar(planar, sample_rate)
}

/// Reads the next packet. `Ok(None)` means end of stream.
fn read_next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, DecodeError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        // Some demuxers report the end of stream as a decode error.
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(DecodeError::AudioError(e)),
    }
}

/// Appends a decoded packet to planar storage, scaled to f32.
fn append_planar(planar: &mut Vec<Vec<f32>>, decoded: AudioBufferRef) {
    match decoded {
        AudioBufferRef::F32(buf) => extend_planes(planar, &buf, |s| s),
        AudioBufferRef::F64(buf) => extend_planes(planar, &buf, |s| s as f32),
        AudioBufferRef::S8(buf) => extend_planes(planar, &buf, scale_s8),
        AudioBufferRef::S16(buf) => extend_planes(planar, &buf, scale_s16),
        AudioBufferRef::S24(buf) => extend_planes(planar, &buf, |s| scale_s24(s.inner())),
        AudioBufferRef::S32(buf) => extend_planes(planar, &buf, scale_s32),
        AudioBufferRef::U8(buf) => extend_planes(planar, &buf, scale_u8),
        AudioBufferRef::U16(buf) => extend_planes(planar, &buf, scale_u16),
        AudioBufferRef::U24(buf) => extend_planes(planar, &buf, |s| scale_u24(s.inner())),
        AudioBufferRef::U32(buf) => extend_planes(planar, &buf, scale_u32),
    }
}

fn extend_planes<T, F>(planar: &mut Vec<Vec<f32>>, buf: &AudioBuffer<T>, convert: F)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let channels = buf.spec().channels.count();
    if planar.len() < channels {
        planar.resize(channels, Vec::new());
    }
    for (ch, plane) in buf.planes().planes().iter().enumerate().take(channels) {
        planar[ch].extend(plane.iter().map(|s| convert(*s)));
    }
}

#[inline]
pub(crate) fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
pub(crate) fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
pub(crate) fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
pub(crate) fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
pub(crate) fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_scaling_helpers() {
        assert_eq!(scale_s16(0), 0.0);
        assert_eq!(scale_s16(i16::MIN), -1.0);
        assert!((scale_s16(i16::MAX) - 1.0).abs() < 0.0001);
        assert_eq!(scale_s8(i8::MIN), -1.0);
        assert_eq!(scale_s32(i32::MIN), -1.0);
        assert_eq!(scale_s24(-(1 << 23)), -1.0);
        assert_eq!(scale_u8(0), -1.0);
        assert_eq!(scale_u8(u8::MAX), 1.0);
        assert_eq!(scale_u16(u16::MAX), 1.0);
        assert_eq!(scale_u24((1 << 24) - 1), 1.0);
        assert_eq!(scale_u32(0), -1.0);
    }

    #[test]
    fn test_decode_float_wav() {
        let left = vec![0.5f32, 0.25, -0.25, -0.5];
        let right = vec![-0.5f32, -0.25, 0.25, 0.5];
        let bytes = wav_bytes(&[left.clone(), right.clone()], 44100);

        let buffer = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.channel(0).unwrap(), left.as_slice());
        assert_eq!(buffer.channel(1).unwrap(), right.as_slice());
    }

    #[test]
    fn test_decode_without_hint() {
        let bytes = wav_bytes(&[vec![0.1f32; 128]], 22050);
        let buffer = decode_bytes(bytes, None).unwrap();
        assert_eq!(buffer.frames(), 128);
        assert_eq!(buffer.sample_rate(), 22050);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_bytes(b"definitely not audio".to_vec(), Some("wav"));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(decode_bytes(Vec::new(), None).is_err());
    }
}
