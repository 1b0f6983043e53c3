//! The per-file processing pipeline.
//!
//! For one uploaded GIF the pipeline:
//!
//! 1. writes the bytes to a scratch file,
//! 2. decodes it and keeps every other frame ([`frames::decimate`]), doubling the frame delay
//!    so playback time stays roughly the same,
//! 3. writes the reduced animation to a second scratch file,
//! 4. runs gifsicle over it ([`gifsicle::Gifsicle::optimize`]) into a third scratch file,
//! 5. reads the result back.
//!
//! All three scratch files are removed before [`Pipeline::process`] returns, on success and on
//! every failure path. A [`Pipeline`] holds no per-call state, so one instance is shared by all
//! requests.

pub mod frames;
pub mod gifsicle;
pub mod scratch;
pub mod settings;

pub use frames::DecodeLimits;
pub use gifsicle::{Gifsicle, OptimizerStatus};
pub use scratch::ScratchDir;
pub use settings::{InvalidSettings, OptimizationSettings};

use crate::config::Config;
use std::path::Path;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::{debug, info, instrument};

/// Why a single file could not be optimized. The `Display` text is what the caller sees.
#[derive(Debug, ThisError)]
pub enum PipelineError {
    /// gifsicle was not found at startup
    #[error("Gifsicle command is unavailable. Please check the server environment.")]
    Unavailable,

    #[error("Unexpected error during processing: Could not extract valid frames from GIF.")]
    NoFrames,

    /// Decoding or encoding the animation failed
    #[error("Unexpected error during processing: {0}")]
    Image(#[from] image::ImageError),

    /// Scratch file or subprocess I/O failed
    #[error("Unexpected error during processing: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gifsicle execution error (Code {}): {diagnostics}", display_code(.code))]
    OptimizerFailed { code: Option<i32>, diagnostics: String },

    #[error("Unexpected error during processing: Gifsicle timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Unexpected error during processing: Gifsicle output file was not created.")]
    OutputMissing,
}

impl PipelineError {
    /// A non-zero gifsicle exit. Empty diagnostics are replaced by a generic message.
    pub fn optimizer_failed(code: Option<i32>, diagnostics: String) -> Self {
        let diagnostics = if diagnostics.is_empty() {
            "Unknown Gifsicle error".to_string()
        } else {
            diagnostics
        };
        PipelineError::OptimizerFailed { code, diagnostics }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Decimate-then-gifsicle pipeline shared by all requests.
#[derive(Debug, Clone)]
pub struct Pipeline {
    scratch: ScratchDir,
    gifsicle: Gifsicle,
    encoder_speed: i32,
    decode_limits: DecodeLimits,
}

impl Pipeline {
    pub fn new(scratch: ScratchDir, gifsicle: Gifsicle, encoder_speed: i32) -> Self {
        Self {
            scratch,
            gifsicle,
            encoder_speed,
            decode_limits: DecodeLimits::default(),
        }
    }

    pub fn with_decode_limits(mut self, decode_limits: DecodeLimits) -> Self {
        self.decode_limits = decode_limits;
        self
    }

    /// Create the scratch directory and detect gifsicle. Called once at startup.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let scratch = ScratchDir::create(&config.scratch_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create scratch directory {}: {}", config.scratch_dir.display(), e))?;
        let gifsicle = Gifsicle::detect(&config.optimizer).await;
        Ok(Self::new(scratch, gifsicle, config.encoder.speed).with_decode_limits(DecodeLimits::from(&config.limits)))
    }

    pub fn optimizer(&self) -> &Gifsicle {
        &self.gifsicle
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Run the whole pipeline over one GIF and return the optimized bytes.
    #[instrument(skip_all, fields(input_bytes = input.len(), lossy = settings.lossy(), colors = settings.colors(), scratch_id = tracing::field::Empty))]
    pub async fn process(&self, input: &[u8], settings: OptimizationSettings) -> Result<Vec<u8>, PipelineError> {
        if !self.gifsicle.is_available() {
            return Err(PipelineError::Unavailable);
        }

        let scratch::ScratchSet {
            id,
            input: input_file,
            reduced,
            output,
        } = self.scratch.allocate();
        tracing::Span::current().record("scratch_id", id.as_str());

        tokio::fs::write(&*input_file, input).await?;

        // The blocking task owns the first two guards, so they are cleaned up even if this
        // future is dropped while decoding is still running. The input is no longer needed
        // afterwards and is removed as soon as the task ends.
        let (encoder_speed, decode_limits) = (self.encoder_speed, self.decode_limits);
        let (summary, reduced) = tokio::task::spawn_blocking(move || {
            let summary = frames::decimate(&input_file, &reduced, encoder_speed, &decode_limits)?;
            drop(input_file);
            Ok::<_, PipelineError>((summary, reduced))
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!(
            source_frames = summary.source_frames,
            kept_frames = summary.kept_frames,
            frame_delay_ms = summary.frame_delay_ms,
            "Frames decimated"
        );

        self.gifsicle.optimize(settings, &reduced, &output).await?;
        let optimized = tokio::fs::read(&*output).await?;

        info!(optimized_bytes = optimized.len(), "GIF optimized");
        Ok(optimized)
    }
}
