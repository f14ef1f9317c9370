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

//! 16-bit PCM WAV encoding.
//!
//! The output is a canonical 44 byte RIFF/WAVE header followed by interleaved
//! little-endian samples. Nothing else is written: no padding, no extra chunks.

use super::buffer::SampleBuffer;
use super::error::EncodingError;

/// Size of the RIFF, fmt and data chunk headers.
pub const HEADER_SIZE: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FMT_CHUNK_SIZE: u32 = 16;
const PCM_FORMAT: u16 = 1;

/// Encodes the buffer as a 16-bit PCM WAV image.
pub fn encode(buffer: &SampleBuffer) -> Result<Vec<u8>, EncodingError> {
    let channels = buffer.channels();
    if channels.is_empty() {
        return Err(EncodingError::NoChannels);
    }
    let channel_count: u16 = channels
        .len()
        .try_into()
        .map_err(|_| EncodingError::TooManyChannels(channels.len()))?;
    let sample_rate = buffer.sample_rate();
    if sample_rate == 0 {
        return Err(EncodingError::InvalidSampleRate);
    }

    let frames = channels[0].len();
    for (index, channel) in channels.iter().enumerate() {
        if channel.len() != frames {
            return Err(EncodingError::ChannelLengthMismatch {
                channel: index,
                expected: frames,
                actual: channel.len(),
            });
        }
    }

    let data_bytes = frames as u64 * channel_count as u64 * BYTES_PER_SAMPLE as u64;
    // The RIFF size field covers everything after itself.
    let riff_size: u32 = (36 + data_bytes)
        .try_into()
        .map_err(|_| EncodingError::TooLarge(data_bytes))?;
    let data_size = data_bytes as u32;

    let block_align = channel_count * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or(EncodingError::InvalidSampleRate)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + data_bytes as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&riff_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    buf.extend_from_slice(&PCM_FORMAT.to_le_bytes());
    buf.extend_from_slice(&channel_count.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for frame in 0..frames {
        for channel in channels {
            buf.extend_from_slice(&to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    Ok(buf)
}

/// Converts a float sample to 16-bit PCM, clamping to full scale first.
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(wav: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([wav[offset], wav[offset + 1]])
    }

    fn read_u32(wav: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            wav[offset],
            wav[offset + 1],
            wav[offset + 2],
            wav[offset + 3],
        ])
    }

    #[test]
    fn test_silent_stereo() {
        let frames = 1000;
        let wav = encode(&SampleBuffer::silence(2, frames, 44100)).unwrap();

        assert_eq!(wav.len(), 44 + frames * 4);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav[44..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_header_fields() {
        let buffer = SampleBuffer::new(vec![vec![0.25; 10], vec![-0.25; 10]], 48000).unwrap();
        let wav = encode(&buffer).unwrap();

        assert_eq!(read_u32(&wav, 4), 36 + 40);
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(read_u32(&wav, 16), 16);
        assert_eq!(read_u16(&wav, 20), 1);
        assert_eq!(read_u16(&wav, 22), 2);
        assert_eq!(read_u32(&wav, 24), 48000);
        assert_eq!(read_u32(&wav, 28), 48000 * 4);
        assert_eq!(read_u16(&wav, 32), 4);
        assert_eq!(read_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(read_u32(&wav, 40), 40);
    }

    #[test]
    fn test_mono_header() {
        let wav = encode(&SampleBuffer::silence(1, 5, 22050)).unwrap();
        assert_eq!(wav.len(), 44 + 10);
        assert_eq!(read_u16(&wav, 22), 1);
        assert_eq!(read_u32(&wav, 28), 22050 * 2);
        assert_eq!(read_u16(&wav, 32), 2);
    }

    #[test]
    fn test_full_scale() {
        let buffer = SampleBuffer::new(vec![vec![1.0], vec![-1.0]], 44100).unwrap();
        let wav = encode(&buffer).unwrap();

        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), -32767);
    }

    #[test]
    fn test_interleaving_order() {
        let buffer = SampleBuffer::new(vec![vec![0.5, 0.0], vec![0.0, -0.5]], 44100).unwrap();
        let wav = encode(&buffer).unwrap();
        let samples: Vec<i16> = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        assert_eq!(samples, vec![16384, 0, 0, -16384]);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(to_pcm16(1.5), 32767);
        assert_eq!(to_pcm16(-7.0), -32767);
        assert_eq!(to_pcm16(f32::INFINITY), 32767);
        assert_eq!(to_pcm16(f32::NAN), 0);
        assert_eq!(to_pcm16(0.0), 0);
    }

    #[test]
    fn test_deterministic() {
        let samples: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin()).collect();
        let buffer = SampleBuffer::new(vec![samples.clone(), samples], 44100).unwrap();

        assert_eq!(encode(&buffer).unwrap(), encode(&buffer).unwrap());
    }

    #[test]
    fn test_invalid_buffers() {
        assert_eq!(
            encode(&SampleBuffer::from_planar_unchecked(vec![], 44100)),
            Err(EncodingError::NoChannels)
        );
        assert_eq!(
            encode(&SampleBuffer::from_planar_unchecked(vec![vec![0.0; 4]], 0)),
            Err(EncodingError::InvalidSampleRate)
        );
        assert_eq!(
            encode(&SampleBuffer::from_planar_unchecked(
                vec![vec![0.0; 4], vec![0.0; 3]],
                44100
            )),
            Err(EncodingError::ChannelLengthMismatch {
                channel: 1,
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_empty_buffer() {
        let wav = encode(&SampleBuffer::silence(2, 0, 44100)).unwrap();
        assert_eq!(wav.len(), HEADER_SIZE);
        assert_eq!(read_u32(&wav, 4), 36);
        assert_eq!(read_u32(&wav, 40), 0);
    }
}
