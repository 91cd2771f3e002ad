//! pcmtensor - Audio Decoding into PCM Tensors
//!
//! Decodes an audio file or in-memory buffer into interleaved PCM samples,
//! optionally resampled or filtered, exposed as a DLPack-style tensor that
//! either owns its memory or writes into a caller buffer.

pub mod audio;
pub mod config;
pub mod error;
pub mod processing;
pub mod tensor;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Once;

pub use audio::{InputHint, Source};
pub use config::Config;
pub use error::{DecodeAudioError, ErrorKind, Result};
pub use processing::{AudioDecoder, AudioDescriptor, DecodeRequest, OutputRequest};
pub use tensor::Tensor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

static INIT: Once = Once::new();

pub fn init_logging(verbose: bool) {
    unsafe {
        std::env::set_var("RUST_LOG", if verbose { "debug" } else { "info" });
    }
    env_logger::Builder::from_env("RUST_LOG")
        .filter_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .try_init()
        .ok();
}

/// One-time engine setup. Call at startup; later calls do nothing.
pub fn initialize() {
    INIT.call_once(|| {
        let _ = symphonia::default::get_codecs();
        let _ = symphonia::default::get_probe();
        log::info!(
            "{} initialized ({} output sample formats)",
            get_library_info(),
            audio::SAMPLE_FORMATS.len()
        );
    });
}

pub fn is_initialized() -> bool {
    INIT.is_completed()
}

/// Decode with the default configuration
pub fn decode_audio(request: DecodeRequest<'_>) -> AudioDescriptor<'_> {
    initialize();
    AudioDecoder::default().decode(request)
}

pub fn get_library_info() -> LibraryInfo {
    LibraryInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl std::fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{} - {}", self.name, self.version, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        initialize();
        initialize();
        assert!(is_initialized());
    }

    #[test]
    fn test_decode_audio_entry_point() {
        let wav = test_utils::tone_wav(test_utils::int_spec(1, 16000, 16), 1600);
        let d = decode_audio(DecodeRequest::new(Source::memory(wav)));
        assert!(d.is_ok(), "{}", d.error);
        assert_eq!(d.num_samples, 1600);
        assert!(is_initialized());
    }

    #[test]
    fn test_library_info() {
        let info = get_library_info();
        assert_eq!(info.name, "pcmtensor");
        assert!(info.to_string().contains(VERSION));
    }
}
