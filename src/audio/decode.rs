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
use std::io::Cursor;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::SampleBuffer;
use super::error::DecodeError;

/// Decodes an entire audio file image (WAV, MP3, FLAC, etc.) into memory.
/// The extension, if known, helps symphonia pick a format reader.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, DecodeError> {
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
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params.sample_rate.ok_or(DecodeError::MissingSampleRate)?;
    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    // A zero here means the container didn't say; the first decoded packet decides.
    let mut channel_count = params.channels.map(|c| c.count()).unwrap_or(0);
    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    while let Some(packet) = next_packet(format_reader.as_mut(), decoder.as_mut(), track_id)? {
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                debug!("Decoder reset required, skipping packet");
                decoder.reset();
                continue;
            }
            // A corrupt frame in the middle of a stream is skipped.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let decoded_channels = decoded.spec().channels.count();
        if channel_count == 0 {
            channel_count = decoded_channels;
            channels = vec![Vec::new(); channel_count];
        }
        if decoded_channels != channel_count {
            return Err(DecodeError::Unsupported(format!(
                "channel count changed from {} to {} mid-stream",
                channel_count, decoded_channels
            )));
        }

        append_planar(decoded, &mut channels);
    }

    if channel_count == 0 {
        return Err(DecodeError::MissingChannels);
    }
    if channels.iter().all(|c| c.is_empty()) {
        return Err(DecodeError::Empty);
    }

    debug!(
        channels = channel_count,
        sample_rate,
        frames = channels[0].len(),
        "Decoded audio"
    );

    SampleBuffer::new(channels, sample_rate)
}

/// Reads the next packet for the given track. Returns `Ok(None)` at the end of the stream.
fn next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Option<Packet>, DecodeError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Appends a decoded packet to the planar channel storage, scaling to [-1.0, 1.0].
fn append_planar(decoded: AudioBufferRef, channels: &mut [Vec<f32>]) {
    match decoded {
        AudioBufferRef::F32(buf) => extend_channels(&buf, channels, |s| s),
        AudioBufferRef::F64(buf) => extend_channels(&buf, channels, |s| s as f32),
        AudioBufferRef::S8(buf) => extend_channels(&buf, channels, scale_s8),
        AudioBufferRef::S16(buf) => extend_channels(&buf, channels, scale_s16),
        AudioBufferRef::S24(buf) => extend_channels(&buf, channels, |s| scale_s24(s.inner())),
        AudioBufferRef::S32(buf) => extend_channels(&buf, channels, scale_s32),
        AudioBufferRef::U8(buf) => extend_channels(&buf, channels, scale_u8),
        AudioBufferRef::U16(buf) => extend_channels(&buf, channels, scale_u16),
        AudioBufferRef::U24(buf) => extend_channels(&buf, channels, |s| scale_u24(s.inner())),
        AudioBufferRef::U32(buf) => extend_channels(&buf, channels, scale_u32),
    }
}

fn extend_channels<T, F>(buf: &AudioBuffer<T>, channels: &mut [Vec<f32>], convert: F)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    for (ch_idx, channel) in channels.iter_mut().enumerate() {
        channel.extend(buf.chan(ch_idx).iter().map(|sample| convert(*sample)));
    }
}

#[inline]
fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}
