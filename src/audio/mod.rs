//! Audio Module
//!
//! Sample format table, input sources and the frame type passed between
//! the decoder, the filter graph and the sample writer.

pub mod format;
pub mod frame;
pub mod sample;
pub mod source;

pub use format::{
    ByteOrder, NativeFormat, PcmFormat, SampleFormatEntry, SampleLayout, SAMPLE_FORMATS,
};
pub use frame::Frame;
pub use sample::PcmSample;
pub use source::{InputHint, MemoryCursor, Source, Whence};
