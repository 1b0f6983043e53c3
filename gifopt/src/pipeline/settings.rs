//! Per-request optimization settings.

use crate::config::SettingsDefaults;
use std::num::IntErrorKind;
use std::ops::RangeInclusive;
use thiserror::Error as ThisError;

/// Accepted range for gifsicle's `--lossy` strength.
pub const LOSSY_RANGE: RangeInclusive<i64> = 0..=300;
/// Accepted range for gifsicle's `--colors` palette size.
pub const COLORS_RANGE: RangeInclusive<i64> = 2..=256;

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("Invalid optimization settings value.")]
pub struct InvalidSettings {
    pub field: &'static str,
    pub value: String,
}

/// Lossy strength and palette size shared by every file of one request.
///
/// Out-of-range values are clamped into [`LOSSY_RANGE`] and [`COLORS_RANGE`] rather than
/// rejected, so a constructed value is always valid to hand to gifsicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationSettings {
    lossy: u16,
    colors: u16,
}

impl OptimizationSettings {
    pub fn new(lossy: i64, colors: i64) -> Self {
        Self {
            lossy: clamp(lossy, &LOSSY_RANGE),
            colors: clamp(colors, &COLORS_RANGE),
        }
    }

    /// Build settings from raw multipart form values, falling back to `defaults` for absent fields.
    pub fn from_form(lossy: Option<&str>, colors: Option<&str>, defaults: &SettingsDefaults) -> Result<Self, InvalidSettings> {
        let lossy = parse_field("lossy", lossy, defaults.lossy)?;
        let colors = parse_field("colors", colors, defaults.colors)?;
        Ok(Self::new(lossy, colors))
    }

    pub fn lossy(&self) -> u16 {
        self.lossy
    }

    pub fn colors(&self) -> u16 {
        self.colors
    }
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        let defaults = SettingsDefaults::default();
        Self::new(defaults.lossy, defaults.colors)
    }
}

/// Integers too large for `i64` saturate, so they end up clamped like any other out-of-range value.
fn parse_field(field: &'static str, raw: Option<&str>, default: i64) -> Result<i64, InvalidSettings> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.trim().parse::<i64>() {
        Ok(parsed) => Ok(parsed),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(i64::MAX),
        Err(e) if *e.kind() == IntErrorKind::NegOverflow => Ok(i64::MIN),
        Err(_) => Err(InvalidSettings {
            field,
            value: value.to_string(),
        }),
    }
}

fn clamp(value: i64, range: &RangeInclusive<i64>) -> u16 {
    // both ranges sit well inside u16
    value.clamp(*range.start(), *range.end()) as u16
}
