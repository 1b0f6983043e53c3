//! Frame decimation: keep every other frame and stretch the delay to compensate.
//!
//! This runs synchronously and is CPU bound; callers on the async runtime should go through
//! `spawn_blocking`.

use super::PipelineError;
use crate::config::LimitsConfig;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::error::{LimitError, LimitErrorKind};
use image::{AnimationDecoder, Delay, Frame, ImageDecoder, ImageError, Limits};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Delay assumed when the source GIF does not specify one.
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// Bounds on what a single upload may cost to decode.
///
/// The logical screen size is checked before any pixel buffer is allocated, and the kept frames
/// are charged against `max_bytes` as they accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_dimension: u32,
    pub max_bytes: u64,
}

impl From<&LimitsConfig> for DecodeLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_dimension: limits.max_decode_dimension,
            max_bytes: limits.max_decode_bytes,
        }
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl DecodeLimits {
    fn decoder_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_bytes);
        limits
    }
}

/// Shape of the intermediate image produced by [`decimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationSummary {
    pub source_frames: usize,
    pub kept_frames: usize,
    /// Delay of the source's first frame, used as representative for all frames
    pub source_delay_ms: u32,
    /// Delay written for every kept frame
    pub frame_delay_ms: u32,
}

/// Decode the GIF at `input`, keep frames 0, 2, 4, ... and write them to `output` with twice
/// the source delay and an infinite loop count.
///
/// Frames come out of the decoder fully composited, so dropping one never leaves a
/// dangling partial update behind.
pub fn decimate(
    input: &Path,
    output: &Path,
    encoder_speed: i32,
    limits: &DecodeLimits,
) -> Result<DecimationSummary, PipelineError> {
    let mut decoder = GifDecoder::new(BufReader::new(File::open(input)?))?;
    decoder.set_limits(limits.decoder_limits())?;

    let mut source_frames = 0;
    let mut first_delay_ms = None;
    let mut kept = Vec::new();
    let mut kept_bytes: u64 = 0;

    for (index, frame) in decoder.into_frames().enumerate() {
        let frame = frame?;
        source_frames += 1;
        if first_delay_ms.is_none() {
            first_delay_ms = Some(delay_ms(frame.delay()));
        }
        if index % 2 == 0 {
            kept_bytes = kept_bytes.saturating_add(frame.buffer().as_raw().len() as u64);
            if kept_bytes > limits.max_bytes {
                return Err(ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory)).into());
            }
            kept.push(frame);
        }
    }

    if kept.is_empty() {
        return Err(PipelineError::NoFrames);
    }

    let source_delay_ms = match first_delay_ms {
        Some(0) | None => DEFAULT_FRAME_DELAY_MS,
        Some(ms) => ms,
    };
    let frame_delay_ms = source_delay_ms.saturating_mul(2);
    let kept_frames = kept.len();

    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buffer, encoder_speed);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(kept.into_iter().map(|frame| {
            let (left, top) = (frame.left(), frame.top());
            Frame::from_parts(frame.into_buffer(), left, top, Delay::from_numer_denom_ms(frame_delay_ms, 1))
        }))?;
        // the trailer is written when the encoder drops
    }
    std::fs::write(output, &buffer)?;

    Ok(DecimationSummary {
        source_frames,
        kept_frames,
        source_delay_ms,
        frame_delay_ms,
    })
}

fn delay_ms(delay: Delay) -> u32 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 { 0 } else { numer / denom }
}
