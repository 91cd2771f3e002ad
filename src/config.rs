//! Configuration management for decoding

use crate::error::{DecodeAudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub decode: DecodeConfig,
    pub resampler: ResamplerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Size of the error slot in bytes, terminator included
    pub error_capacity: usize,
    /// Output format token used when a request names none; empty keeps the input format
    pub default_output_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Linear,
    Quadratic,
    Cubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Blackman,
    Blackman2,
    BlackmanHarris,
    BlackmanHarris2,
    Hann,
    Hann2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplerConfig {
    pub sinc_len: usize,
    pub f_cutoff: f32,
    pub oversampling_factor: usize,
    pub interpolation: Interpolation,
    pub window: Window,
    /// Frames fed to the resampler per call
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            error_capacity: 128,
            default_output_format: String::new(),
        }
    }
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 256,
            interpolation: Interpolation::Linear,
            window: Window::BlackmanHarris2,
            chunk_size: 1024,
        }
    }
}

impl ResamplerConfig {
    pub fn interpolation_parameters(&self) -> rubato::SincInterpolationParameters {
        rubato::SincInterpolationParameters {
            sinc_len: self.sinc_len,
            f_cutoff: self.f_cutoff,
            interpolation: match self.interpolation {
                Interpolation::Nearest => rubato::SincInterpolationType::Nearest,
                Interpolation::Linear => rubato::SincInterpolationType::Linear,
                Interpolation::Quadratic => rubato::SincInterpolationType::Quadratic,
                Interpolation::Cubic => rubato::SincInterpolationType::Cubic,
            },
            oversampling_factor: self.oversampling_factor,
            window: match self.window {
                Window::Blackman => rubato::WindowFunction::Blackman,
                Window::Blackman2 => rubato::WindowFunction::Blackman2,
                Window::BlackmanHarris => rubato::WindowFunction::BlackmanHarris,
                Window::BlackmanHarris2 => rubato::WindowFunction::BlackmanHarris2,
                Window::Hann => rubato::WindowFunction::Hann,
                Window::Hann2 => rubato::WindowFunction::Hann2,
            },
        }
    }
}

impl Config {
    /// Get verbose mode (convenience method)
    pub fn verbose(&self) -> bool {
        self.logging.verbose
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DecodeAudioError::config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DecodeAudioError::config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameter validity
    pub fn validate(&self) -> Result<()> {
        if self.decode.error_capacity < 2 {
            return Err(DecodeAudioError::config("Error capacity must hold at least one character"));
        }

        let token = &self.decode.default_output_format;
        if !token.is_empty() && crate::audio::format::lookup_token(token).is_none() {
            return Err(DecodeAudioError::config(format!(
                "Unknown default output format: {}",
                token
            )));
        }

        if self.resampler.sinc_len == 0 || self.resampler.sinc_len % 8 != 0 {
            return Err(DecodeAudioError::config("Sinc length must be a positive multiple of 8"));
        }

        if !(self.resampler.f_cutoff > 0.0 && self.resampler.f_cutoff <= 1.0) {
            return Err(DecodeAudioError::config("Cutoff must be in range (0.0, 1.0]"));
        }

        if self.resampler.oversampling_factor == 0 {
            return Err(DecodeAudioError::config("Oversampling factor must be greater than 0"));
        }

        if self.resampler.chunk_size == 0 {
            return Err(DecodeAudioError::config("Resampler chunk size must be greater than 0"));
        }

        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DecodeAudioError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DecodeAudioError::config(format!("Failed to write config file: {}", e)))
    }
}
