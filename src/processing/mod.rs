//! Decode Pipeline
//!
//! Probing and negotiation, the decoder state machine, the filter graph
//! and the interleaving copy into the output tensor.

pub mod decoder;
pub mod filter_graph;
pub mod filters;
pub mod negotiator;
pub mod pipeline;
pub mod writer;

pub use decoder::{DecoderContext, Receive};
pub use filter_graph::{BufferSinkParams, BufferSourceParams, FilterGraph, Pull};
pub use negotiator::{ProbedStream, StreamInfo};
pub use pipeline::{AudioDecoder, AudioDescriptor, DecodeRequest, OutputRequest};
pub use writer::SampleWriter;
