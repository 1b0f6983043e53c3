//! Fixtures shared by the unit and handler tests.

use crate::config::Config;
use crate::pipeline::{DecodeLimits, Gifsicle, OptimizerStatus, Pipeline, ScratchDir};
use axum_test::TestServer;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, Frame, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

const FIXTURE_SIZE: u32 = 8;

/// Solid fill used for fixture frame `index`. Neighbouring frames always differ.
pub fn frame_color(index: usize) -> [u8; 4] {
    const COLORS: [[u8; 4]; 6] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 0, 255],
        [0, 255, 255, 255],
        [255, 0, 255, 255],
    ];
    COLORS[index % COLORS.len()]
}

/// An 8x8 looping GIF with `frames` solid frames, each `delay_ms` long.
pub fn animated_gif(frames: usize, delay_ms: u32) -> Vec<u8> {
    animated_gif_with_delays(&vec![delay_ms; frames])
}

/// Like [`animated_gif`], with one frame per entry of `delays_ms`.
pub fn animated_gif_with_delays(delays_ms: &[u32]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        encoder
            .encode_frames(delays_ms.iter().enumerate().map(|(i, delay_ms)| {
                let image = RgbaImage::from_pixel(FIXTURE_SIZE, FIXTURE_SIZE, Rgba(frame_color(i)));
                Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(*delay_ms, 1))
            }))
            .unwrap();
    }
    buffer
}

/// Decode every frame into `(delay in ms, top-left pixel)`.
pub fn decode_gif(bytes: &[u8]) -> Vec<(u32, [u8; 4])> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).unwrap();
    decoder
        .into_frames()
        .collect_frames()
        .unwrap()
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            (numer / denom, frame.buffer().get_pixel(0, 0).0)
        })
        .collect()
}

/// Palette quantization may shift a channel slightly.
pub fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    let close = actual.iter().zip(expected).all(|(a, e)| a.abs_diff(e) <= 8);
    assert!(close, "pixel {actual:?} is not close to {expected:?}");
}

/// Answers `--version` and records every other invocation's arguments in `args.log`
/// next to itself.
const FAKE_GIFSICLE_PRELUDE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "LCDF Gifsicle 1.94 (fake)"
  exit 0
fi
echo "$@" >> "$(dirname "$0")/args.log"
"#;

/// Copies the input (5th argument) to the output (7th argument).
pub const FAKE_GIFSICLE_COPY: &str = r#"cp "$5" "$7""#;
pub const FAKE_GIFSICLE_FAIL: &str = r#"echo "gifsicle: in.gif: not a GIF" >&2
exit 1"#;
pub const FAKE_GIFSICLE_NO_OUTPUT: &str = "exit 0";
pub const FAKE_GIFSICLE_SLOW: &str = "sleep 5";

/// Write an executable stand-in for gifsicle into `dir`.
#[cfg(unix)]
pub fn fake_gifsicle(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("gifsicle");
    std::fs::write(&path, format!("{FAKE_GIFSICLE_PRELUDE}{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config with its scratch directory under `dir`.
pub fn create_test_config(dir: &Path) -> Config {
    Config {
        scratch_dir: dir.join("scratch"),
        ..Default::default()
    }
}

/// A test server whose optimizer is the given fake script, or unavailable when `None`.
pub async fn create_test_app(config: Config, fake_body: Option<&str>) -> TestServer {
    let gifsicle = match fake_body {
        #[cfg(unix)]
        Some(body) => {
            let binary = fake_gifsicle(config.scratch_dir.parent().unwrap(), body);
            let optimizer = crate::config::OptimizerConfig {
                binary,
                ..config.optimizer.clone()
            };
            Gifsicle::detect(&optimizer).await
        }
        _ => Gifsicle::with_status(&config.optimizer, OptimizerStatus::Unavailable),
    };
    let pipeline = Pipeline::new(ScratchDir::create(&config.scratch_dir).unwrap(), gifsicle, config.encoder.speed)
        .with_decode_limits(DecodeLimits::from(&config.limits));

    crate::Application::with_pipeline(config, pipeline)
        .unwrap()
        .into_test_server()
}
