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

//! Offline (non-real-time) rendering of a buffer at a different playback rate.
//!
//! Playing a buffer at rate `r` is the same as resampling it by `1 / r` and
//! playing the result at the original sample rate, so rendering is resampling.

use std::str::FromStr;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::Deserialize;
use tracing::{debug, span, Level};

use super::buffer::SampleBuffer;
use super::error::RenderError;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Upper bound on flush passes once the input is exhausted.
const MAX_FLUSH_PASSES: usize = 64;

/// Interpolation used when rendering.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Band-limited sinc interpolation.
    #[default]
    Sinc,
    /// Linear interpolation between neighbouring frames. Matches live playback.
    Linear,
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sinc" => Ok(Quality::Sinc),
            "linear" => Ok(Quality::Linear),
            _ => Err(format!("unknown render quality {}", s)),
        }
    }
}

/// Renders `buffer` played at `rate` into exactly `output_length` frames at the
/// buffer's own sample rate and channel count.
pub fn render(
    buffer: &SampleBuffer,
    rate: f64,
    output_length: usize,
    quality: Quality,
) -> Result<SampleBuffer, RenderError> {
    let span = span!(Level::DEBUG, "render");
    let _enter = span.enter();

    if buffer.channel_count() == 0 {
        return Err(RenderError::NoChannels);
    }
    if buffer.sample_rate() == 0 {
        return Err(RenderError::InvalidSampleRate(buffer.sample_rate()));
    }
    if !rate.is_finite() || rate <= 0.0 {
        return Err(RenderError::InvalidRate(rate));
    }
    if output_length == 0 {
        return Err(RenderError::EmptyOutput);
    }
    let frames = buffer.frames();
    if buffer.channels().iter().any(|c| c.len() != frames) {
        return Err(RenderError::Rejected(
            "channels have different lengths".to_string(),
        ));
    }

    debug!(
        rate,
        frames,
        output_length,
        quality = format!("{:?}", quality),
        "Rendering"
    );

    let channels = match quality {
        Quality::Linear => buffer
            .channels()
            .iter()
            .map(|channel| render_linear(channel, rate, output_length))
            .collect(),
        Quality::Sinc => render_sinc(buffer.channels(), rate, output_length)?,
    };

    Ok(SampleBuffer::from_planar_unchecked(
        channels,
        buffer.sample_rate(),
    ))
}

/// Reads the source at position `i * rate` for every output frame.
fn render_linear(channel: &[f32], rate: f64, output_length: usize) -> Vec<f32> {
    (0..output_length)
        .map(|frame| interpolate(channel, frame as f64 * rate))
        .collect()
}

/// Linear interpolation at a fractional frame position. Positions past the end are silent.
#[inline]
pub fn interpolate(channel: &[f32], position: f64) -> f32 {
    let index = position.floor() as usize;
    let frac = (position - position.floor()) as f32;

    match (channel.get(index), channel.get(index + 1)) {
        (Some(s0), Some(s1)) => s0 + (s1 - s0) * frac,
        (Some(s0), None) => *s0,
        _ => 0.0,
    }
}

fn render_sinc(
    channels: &[Vec<f32>],
    rate: f64,
    output_length: usize,
) -> Result<Vec<Vec<f32>>, RenderError> {
    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        1.0 / rate,
        1.0,
        sinc_params,
        INPUT_BLOCK_SIZE,
        channels.len(),
    )
    .map_err(|e| RenderError::ResamplingFailed(rate, e.to_string()))?;

    // The resampler's output starts late by its delay; drop that much from the front.
    let delay = resampler.output_delay();
    let wanted = output_length + delay;
    let frames = channels[0].len();

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels.len()];
    let mut position = 0;

    while position < frames && output[0].len() < wanted {
        let needed = resampler.input_frames_next();
        let processed = if position + needed <= frames {
            let block: Vec<&[f32]> = channels
                .iter()
                .map(|c| &c[position..position + needed])
                .collect();
            position += needed;
            resampler.process(&block, None)
        } else {
            let block: Vec<&[f32]> = channels.iter().map(|c| &c[position..]).collect();
            position = frames;
            resampler.process_partial(Some(&block), None)
        }
        .map_err(|e| RenderError::ResamplingFailed(rate, e.to_string()))?;

        for (out, rendered) in output.iter_mut().zip(processed) {
            out.extend(rendered);
        }
    }

    // Push silence through until the tail of the signal has come out.
    let mut passes = 0;
    while output[0].len() < wanted && passes < MAX_FLUSH_PASSES {
        let processed = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| RenderError::ResamplingFailed(rate, e.to_string()))?;
        if processed.first().map(|c| c.is_empty()).unwrap_or(true) {
            break;
        }
        for (out, rendered) in output.iter_mut().zip(processed) {
            out.extend(rendered);
        }
        passes += 1;
    }

    for out in output.iter_mut() {
        out.drain(..delay.min(out.len()));
        out.resize(output_length, 0.0);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_linear_identity() {
        let samples = sine(1000, 44100);
        let buffer = SampleBuffer::new(vec![samples.clone(), samples.clone()], 44100).unwrap();

        let rendered = render(&buffer, 1.0, 1000, Quality::Linear).unwrap();
        assert_eq!(rendered, buffer);
    }

    #[test]
    fn test_linear_double_speed() {
        let buffer = SampleBuffer::new(vec![vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]], 8000).unwrap();

        let rendered = render(&buffer, 2.0, 3, Quality::Linear).unwrap();
        assert_eq!(rendered.channels()[0], vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_linear_half_speed() {
        let buffer = SampleBuffer::new(vec![vec![0.0, 1.0, 2.0]], 8000).unwrap();

        let rendered = render(&buffer, 0.5, 6, Quality::Linear).unwrap();
        assert_eq!(rendered.channels()[0], vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.0]);
    }

    #[test]
    fn test_sinc_exact_length() {
        let samples = sine(4410, 44100);
        let buffer = SampleBuffer::new(vec![samples.clone(), samples], 44100).unwrap();

        for (rate, expected) in [(2.0, 2205), (0.5, 8820), (1.25, 3528), (0.05, 88200)] {
            let rendered = render(&buffer, rate, expected, Quality::Sinc).unwrap();
            assert_eq!(rendered.frames(), expected, "rate {}", rate);
            assert_eq!(rendered.channel_count(), 2);
            assert_eq!(rendered.sample_rate(), 44100);
        }
    }

    #[test]
    fn test_sinc_preserves_signal() {
        let samples = sine(8820, 44100);
        let buffer = SampleBuffer::new(vec![samples], 44100).unwrap();

        let rendered = render(&buffer, 0.5, 17640, Quality::Sinc).unwrap();
        let peak = rendered.channels()[0]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.5, "peak was {}", peak);
    }

    #[test]
    fn test_rejections() {
        let buffer = SampleBuffer::silence(2, 100, 44100);
        assert_eq!(
            render(&buffer, 0.0, 10, Quality::Linear),
            Err(RenderError::InvalidRate(0.0))
        );
        assert!(matches!(
            render(&buffer, f64::NAN, 10, Quality::Sinc),
            Err(RenderError::InvalidRate(_))
        ));
        assert_eq!(
            render(&buffer, 1.0, 0, Quality::Linear),
            Err(RenderError::EmptyOutput)
        );
        assert_eq!(
            render(
                &SampleBuffer::from_planar_unchecked(vec![], 44100),
                1.0,
                10,
                Quality::Linear
            ),
            Err(RenderError::NoChannels)
        );
        assert_eq!(
            render(
                &SampleBuffer::from_planar_unchecked(vec![vec![0.0; 10]], 0),
                1.0,
                10,
                Quality::Linear
            ),
            Err(RenderError::InvalidSampleRate(0))
        );
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!("sinc".parse::<Quality>().unwrap(), Quality::Sinc);
        assert_eq!("Linear".parse::<Quality>().unwrap(), Quality::Linear);
        assert!("cubic".parse::<Quality>().is_err());
    }
}
