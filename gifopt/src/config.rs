//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `GIFOPT_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GIFOPT_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GIFOPT_OPTIMIZER__TIMEOUT=30s` sets the `optimizer.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use gifopt::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! GIFOPT_PORT=8080
//!
//! # Use a gifsicle binary outside of PATH
//! GIFOPT_OPTIMIZER__BINARY=/opt/gifsicle/bin/gifsicle
//!
//! # Lower the default lossy strength applied when the form omits it
//! GIFOPT_DEFAULTS__LOSSY=80
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GIFOPT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Directory holding per-call scratch files. Created at startup if absent.
    pub scratch_dir: PathBuf,
    /// External optimizer (gifsicle) invocation settings
    pub optimizer: OptimizerConfig,
    /// Intermediate GIF encoder settings
    pub encoder: EncoderConfig,
    /// Settings applied when a request omits `lossy` or `colors`
    pub defaults: SettingsDefaults,
    /// Request size limits
    pub limits: LimitsConfig,
    /// Cross-origin resource sharing
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            scratch_dir: PathBuf::from("temp_gifsicle_data"),
            optimizer: OptimizerConfig::default(),
            encoder: EncoderConfig::default(),
            defaults: SettingsDefaults::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// How gifsicle is located and invoked.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Binary name or path (default: `gifsicle`, resolved through PATH)
    pub binary: PathBuf,
    /// Value passed as `-O<level>` (1..=3, default: 3)
    pub optimization_level: u8,
    /// Hard wall-clock limit for one invocation (default: 90s)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("gifsicle"),
            optimization_level: 3,
            timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// NeuQuant speed used when writing the intermediate GIF (1 = best, 30 = fastest).
    /// gifsicle re-quantizes afterwards, so a fast setting loses little.
    pub speed: i32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { speed: 10 }
    }
}

/// Fallback values for the `lossy` and `colors` form fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsDefaults {
    pub lossy: i64,
    pub colors: i64,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self { lossy: 200, colors: 64 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum size of a whole upload request in bytes (default: 100 MiB)
    pub max_upload_size: u64,
    /// Largest logical screen width or height a GIF may declare (default: 16384)
    pub max_decode_dimension: u32,
    /// Memory budget for decoding one GIF, covering every frame kept in memory (default: 512 MiB)
    pub max_decode_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024,
            max_decode_dimension: 16384,
            max_decode_bytes: 512 * 1024 * 1024,
        }
    }
}

/// CORS configuration. The frontend usually lives on a different origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Preflight cache duration in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: None,
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.optimizer.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: optimizer.timeout must be greater than zero".to_string(),
            });
        }

        if !(1..=3).contains(&self.optimizer.optimization_level) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: optimizer.optimization_level ({}) must be between 1 and 3",
                    self.optimizer.optimization_level
                ),
            });
        }

        if !(1..=30).contains(&self.encoder.speed) {
            return Err(Error::Internal {
                operation: format!("Config validation: encoder.speed ({}) must be between 1 and 30", self.encoder.speed),
            });
        }

        if self.limits.max_upload_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_upload_size must be greater than zero".to_string(),
            });
        }

        if self.limits.max_decode_dimension == 0 || self.limits.max_decode_bytes == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_decode_dimension and limits.max_decode_bytes must be greater than zero"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // GIFOPT_CONFIG names the file itself and is read by clap
            .merge(Env::prefixed("GIFOPT_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 5000);
            assert_eq!(config.scratch_dir, PathBuf::from("temp_gifsicle_data"));
            assert_eq!(config.optimizer.binary, PathBuf::from("gifsicle"));
            assert_eq!(config.optimizer.optimization_level, 3);
            assert_eq!(config.optimizer.timeout, Duration::from_secs(90));
            assert_eq!(config.defaults.lossy, 200);
            assert_eq!(config.defaults.colors, 64);
            assert!(matches!(config.cors.allowed_origins.as_slice(), [CorsOrigin::Wildcard]));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8081
scratch_dir: /var/tmp/gifopt
optimizer:
  binary: /usr/local/bin/gifsicle
  timeout: 30s
defaults:
  lossy: 80
cors:
  allowed_origins:
    - https://app.example.com
  max_age: 600
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 8081);
            assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/gifopt"));
            assert_eq!(config.optimizer.binary, PathBuf::from("/usr/local/bin/gifsicle"));
            assert_eq!(config.optimizer.timeout, Duration::from_secs(30));
            // untouched nested values keep their defaults
            assert_eq!(config.optimizer.optimization_level, 3);
            assert_eq!(config.defaults.lossy, 80);
            assert_eq!(config.defaults.colors, 64);
            assert_eq!(config.cors.max_age, Some(600));
            match &config.cors.allowed_origins[..] {
                [CorsOrigin::Url(url)] => assert_eq!(url.as_str(), "https://app.example.com/"),
                other => panic!("unexpected origins: {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", include_str!("../config.yaml"))?;

            let config = Config::load(&args("config.yaml"))?;
            let defaults = Config::default();

            assert_eq!(config.bind_address(), defaults.bind_address());
            assert_eq!(config.scratch_dir, defaults.scratch_dir);
            assert_eq!(config.optimizer.timeout, defaults.optimizer.timeout);
            assert_eq!(config.encoder.speed, defaults.encoder.speed);
            assert_eq!(config.limits.max_upload_size, defaults.limits.max_upload_size);
            assert_eq!(config.limits.max_decode_dimension, defaults.limits.max_decode_dimension);
            assert_eq!(config.limits.max_decode_bytes, defaults.limits.max_decode_bytes);
            assert!(matches!(config.cors.allowed_origins.as_slice(), [CorsOrigin::Wildcard]));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 8081\n")?;

            jail.set_env("GIFOPT_HOST", "127.0.0.1");
            jail.set_env("GIFOPT_PORT", "9090");
            jail.set_env("GIFOPT_OPTIMIZER__TIMEOUT", "2m");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 9090);
            assert_eq!(config.optimizer.timeout, Duration::from_secs(120));
            assert_eq!(config.bind_address(), "127.0.0.1:9090");

            Ok(())
        });
    }

    #[test]
    fn test_config_path_variable_is_not_a_field() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 8081\n")?;
            jail.set_env("GIFOPT_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml"))?;
            assert_eq!(config.port, 8081);

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "optimiser:\n  binary: gifsicle\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_config_validation_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.optimizer.timeout = Duration::ZERO;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_config_validation_optimization_level() {
        let mut config = Config::default();
        config.optimizer.optimization_level = 4;
        assert!(config.validate().is_err());

        config.optimizer.optimization_level = 0;
        assert!(config.validate().is_err());

        config.optimizer.optimization_level = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_encoder_speed() {
        let mut config = Config::default();
        config.encoder.speed = 0;
        assert!(config.validate().is_err());

        config.encoder.speed = 31;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_upload_limit() {
        let mut config = Config::default();
        config.limits.max_upload_size = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_upload_size"));
    }

    #[test]
    fn test_config_validation_zero_decode_limits() {
        let mut config = Config::default();
        config.limits.max_decode_bytes = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_decode_bytes"));

        let mut config = Config::default();
        config.limits.max_decode_dimension = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_decode_dimension"));
    }

    #[test]
    fn test_decode_limits_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("GIFOPT_LIMITS__MAX_DECODE_BYTES", "1048576");

            let config = Config::load(&args("missing.yaml"))?;
            assert_eq!(config.limits.max_decode_bytes, 1024 * 1024);
            assert_eq!(config.limits.max_decode_dimension, 16384);

            Ok(())
        });
    }
}
