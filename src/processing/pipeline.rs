//! Decode pipeline: probe, negotiate, allocate, decode, filter, copy

use ndarray::Array2;
use symphonia::core::formats::Packet;
use crate::audio::format::{self, Negotiated};
use crate::audio::{Frame, InputHint, PcmFormat, PcmSample, Source};
use crate::config::Config;
use crate::error::{DecodeAudioError, Result};
use crate::processing::decoder::{DecoderContext, Receive};
use crate::processing::filter_graph::{
    BufferSinkParams, BufferSourceParams, FilterGraph, Pull,
};
use crate::processing::negotiator::{self, ProbedStream};
use crate::processing::writer::SampleWriter;
use crate::tensor::Tensor;

/// Requested output; unset fields keep the input stream's values
#[derive(Debug, Default)]
pub struct OutputRequest<'a> {
    pub format: Option<String>,
    pub sample_rate: Option<u32>,
    /// Caller buffer to decode into instead of allocating
    pub buffer: Option<&'a mut [u8]>,
}

#[derive(Debug)]
pub struct DecodeRequest<'a> {
    pub source: Source,
    pub probe_only: bool,
    pub input: InputHint,
    pub output: OutputRequest<'a>,
    pub filter: Option<String>,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            probe_only: false,
            input: InputHint::default(),
            output: OutputRequest::default(),
            filter: None,
        }
    }

    pub fn probe_only(mut self, probe_only: bool) -> Self {
        self.probe_only = probe_only;
        self
    }

    pub fn with_hint(mut self, hint: InputHint) -> Self {
        self.input = hint;
        self
    }

    pub fn output_format<S: Into<String>>(mut self, token: S) -> Self {
        self.output.format = Some(token.into());
        self
    }

    pub fn output_sample_rate(mut self, rate: u32) -> Self {
        self.output.sample_rate = Some(rate);
        self
    }

    pub fn output_buffer(mut self, buffer: &'a mut [u8]) -> Self {
        self.output.buffer = Some(buffer);
        self
    }

    pub fn filter<S: Into<String>>(mut self, expression: S) -> Self {
        self.filter = Some(expression.into());
        self
    }
}

/// Result of one decode call
#[derive(Debug)]
pub struct AudioDescriptor<'a> {
    /// Empty on success
    pub error: String,
    pub fmt: String,
    pub sample_rate: u64,
    pub num_channels: u64,
    pub num_samples: u64,
    pub itemsize: u64,
    pub tensor: Tensor<'a>,
}

impl<'a> AudioDescriptor<'a> {
    fn failed(err: &DecodeAudioError, capacity: usize) -> Self {
        Self {
            error: err.bounded_message(capacity),
            fmt: String::new(),
            sample_rate: 0,
            num_channels: 0,
            num_samples: 0,
            itemsize: 0,
            tensor: Tensor::empty(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    /// Copy the samples out as `[num_samples, num_channels]`
    pub fn to_array<T: PcmSample>(&self) -> Result<Array2<T>> {
        let format = format::lookup_token(&self.fmt).ok_or_else(|| {
            DecodeAudioError::format_negotiation(format!("Unknown format token: '{}'", self.fmt))
        })?;
        if T::ELEMENT != format.element() {
            return Err(DecodeAudioError::format_negotiation(format!(
                "Element type {:?} does not match format {}",
                T::ELEMENT,
                self.fmt
            )));
        }

        let data = self
            .tensor
            .data()
            .ok_or_else(|| DecodeAudioError::decode("Tensor holds no sample data"))?;
        let values: Vec<T> = data
            .chunks_exact(format.itemsize())
            .map(|raw| T::read(raw, format.byte_order()))
            .collect();

        Array2::from_shape_vec((self.num_samples as usize, self.num_channels as usize), values)
            .map_err(|e| DecodeAudioError::decode(format!("Tensor shape mismatch: {}", e)))
    }
}

/// Filter expression to run, if any: the caller's, or one synthesized for
/// a rate or format change
fn graph_expression(
    filter: Option<String>,
    input_rate: u32,
    output_rate: u32,
    formats: &Negotiated,
) -> Option<String> {
    match filter.filter(|expression| !expression.trim().is_empty()) {
        Some(expression) => Some(expression),
        None if output_rate != input_rate => Some(format!("aresample={}", output_rate)),
        None if formats.output != formats.input => Some("anull".to_string()),
        None => None,
    }
}

/// Where decoded frames go: through the graph when there is one, straight
/// into the writer otherwise. `format` is what the writer expects.
struct Sink<'w, 'b> {
    graph: Option<FilterGraph>,
    writer: &'w mut SampleWriter<'b>,
    channels: usize,
    format: PcmFormat,
}

impl Sink<'_, '_> {
    fn dispose(&mut self, frame: Frame) -> Result<()> {
        if frame.channels() != self.channels {
            return Err(DecodeAudioError::decode(format!(
                "Channel count changed mid-stream: {} -> {}",
                self.channels,
                frame.channels()
            )));
        }
        match self.graph.as_mut() {
            Some(graph) => {
                graph.push(Some(frame))?;
                self.drain_graph();
            }
            None if frame.format != self.format => {
                return Err(DecodeAudioError::format_negotiation(format!(
                    "Decoded {} does not match output {}",
                    frame.format, self.format
                )));
            }
            None => {
                self.writer.write_frame(&frame);
            }
        }
        Ok(())
    }

    fn drain_graph(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            while let Pull::Frame(frame) = graph.pull() {
                self.writer.write_frame(&frame);
            }
        }
    }

    fn receive_all(&mut self, decoder: &mut DecoderContext) -> Result<()> {
        loop {
            match decoder.receive_frame() {
                Receive::Frame(frame) => self.dispose(frame)?,
                Receive::Again | Receive::Eof => return Ok(()),
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(graph) = self.graph.as_mut() {
            graph.push(None)?;
        }
        self.drain_graph();
        Ok(())
    }
}

/// Packet loop; `next` yields the stream's packets and `None` at its end
fn run_packets<P>(mut next: P, decoder: &mut DecoderContext, sink: &mut Sink<'_, '_>) -> Result<()>
where
    P: FnMut() -> Result<Option<Packet>>,
{
    // frames decoded while probing come first
    sink.receive_all(decoder)?;

    while let Some(packet) = next()? {
        decoder.send_packet(Some(&packet))?;
        sink.receive_all(decoder)?;
    }

    decoder.send_packet(None)?;
    sink.receive_all(decoder)?;
    sink.finish()
}

/// Decodes audio sources into PCM tensors
#[derive(Debug, Clone, Default)]
pub struct AudioDecoder {
    config: Config,
}

impl AudioDecoder {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decode and report failures through the descriptor's `error`
    pub fn decode<'a>(&self, request: DecodeRequest<'a>) -> AudioDescriptor<'a> {
        match self.try_decode(request) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                log::warn!("Decode failed: {}", err);
                AudioDescriptor::failed(&err, self.config.decode.error_capacity)
            }
        }
    }

    pub fn try_decode<'a>(&self, request: DecodeRequest<'a>) -> Result<AudioDescriptor<'a>> {
        let DecodeRequest { source, probe_only, input, output, filter } = request;
        log::info!("Decoding {}", source);

        let ProbedStream { mut format, mut decoder, info } = negotiator::probe(source, &input)?;

        let requested = match output.format.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => self.config.decode.default_output_format.as_str(),
        };
        let formats = format::negotiate(info.native, requested)?;
        let output_rate = output.sample_rate.filter(|&rate| rate > 0).unwrap_or(info.sample_rate);
        let channels = info.num_channels();
        let estimated = info.estimate_samples(output_rate) as usize;
        let dtype = formats.output.dtype();

        log::info!(
            "Output: {} {} Hz, {} ch, {} samples estimated",
            formats.output, output_rate, channels, estimated
        );

        let descriptor = |tensor: Tensor<'a>| AudioDescriptor {
            error: String::new(),
            fmt: formats.output.token().to_string(),
            sample_rate: output_rate as u64,
            num_channels: channels as u64,
            num_samples: tensor.num_samples() as u64,
            itemsize: formats.output.itemsize() as u64,
            tensor,
        };

        if probe_only {
            return Ok(descriptor(Tensor::metadata(dtype, estimated, channels)));
        }

        let graph = match graph_expression(filter, info.sample_rate, output_rate, &formats) {
            Some(expression) => {
                let source = BufferSourceParams {
                    sample_rate: info.sample_rate,
                    format: formats.input,
                    layout: info.channels,
                    time_base: info.time_base,
                };
                let sink = BufferSinkParams {
                    sample_rate: output_rate,
                    format: formats.output,
                    layout: info.channels,
                };
                Some(FilterGraph::build(source, sink, &expression, &self.config.resampler)?)
            }
            None => None,
        };

        let mut tensor = match output.buffer {
            Some(buffer) => Tensor::borrowed(dtype, estimated, channels, buffer),
            None => Tensor::owned(dtype, estimated, channels),
        };

        {
            let itemsize = formats.output.itemsize();
            let mut writer = SampleWriter::new(tensor.data_mut().unwrap_or_default(), itemsize);
            let mut sink = Sink { graph, writer: &mut writer, channels, format: formats.output };
            let track_id = info.track_id;
            run_packets(
                || negotiator::next_packet(format.as_mut(), track_id),
                &mut decoder,
                &mut sink,
            )?;

            if writer.dropped() > 0 {
                log::debug!("Dropped {} samples beyond the estimated length", writer.dropped());
            }
            if writer.remaining() > 0 {
                log::debug!("{} trailing bytes left zeroed", writer.remaining());
            }
        }

        Ok(descriptor(tensor))
    }
}
