//! Linear filter graph between a buffer source and a buffer sink
//!
//! Expressions are comma separated chains such as `volume=0.5,aresample=16000`.
//! The source takes decoder frames in the stream's native format; the sink
//! emits frames in the negotiated output format and rate. When the chain
//! leaves the audio at another rate than the sink's, a resampler is appended.

use std::collections::VecDeque;
use symphonia::core::audio::Channels;
use symphonia::core::units::TimeBase;
use crate::audio::{Frame, PcmFormat};
use crate::config::ResamplerConfig;
use crate::error::{DecodeAudioError, Result};
use crate::processing::filters::{self, Aresample, AudioFilter, Block, FilterArgs};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSourceParams {
    pub sample_rate: u32,
    pub format: PcmFormat,
    pub layout: Channels,
    pub time_base: TimeBase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSinkParams {
    pub sample_rate: u32,
    pub format: PcmFormat,
    pub layout: Channels,
}

/// Outcome of pulling from the sink
#[derive(Debug)]
pub enum Pull {
    Frame(Frame),
    /// Needs more input
    Again,
    /// End of stream reached and everything drained
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: String,
    pub args: FilterArgs,
}

/// Split a filter expression into its filters
pub fn parse_chain(expression: &str) -> Result<Vec<FilterSpec>> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(DecodeAudioError::filter_graph("Empty filter expression"));
    }
    if expression.contains(';') || expression.contains('[') {
        return Err(DecodeAudioError::filter_graph(format!(
            "Only linear filter chains are supported: '{}'",
            expression
        )));
    }

    expression
        .split(',')
        .map(|part| {
            let part = part.trim();
            let (name, args) = part.split_once('=').unwrap_or((part, ""));
            let name = name.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DecodeAudioError::filter_graph(format!("Invalid filter: '{}'", part)));
            }
            Ok(FilterSpec { name: name.to_string(), args: FilterArgs::parse(args) })
        })
        .collect()
}

pub struct FilterGraph {
    source: BufferSourceParams,
    sink: BufferSinkParams,
    filters: Vec<Box<dyn AudioFilter>>,
    outputs: VecDeque<Frame>,
    next_pts: u64,
    eof: bool,
}

impl FilterGraph {
    pub fn build(
        source: BufferSourceParams,
        sink: BufferSinkParams,
        expression: &str,
        config: &ResamplerConfig,
    ) -> Result<Self> {
        let channels = source.layout.count();
        if channels == 0 {
            return Err(DecodeAudioError::filter_graph("Source has no channels"));
        }
        if sink.layout.count() != channels {
            return Err(DecodeAudioError::filter_graph(format!(
                "Cannot map {} source channels to {} sink channels",
                channels,
                sink.layout.count()
            )));
        }

        let mut filters = parse_chain(expression)?
            .iter()
            .map(|spec| filters::create(&spec.name, &spec.args))
            .collect::<Result<Vec<_>>>()?;

        let mut rate = source.sample_rate;
        for filter in filters.iter_mut() {
            filter.configure(rate, channels, config)?;
            rate = filter.output_rate(rate);
        }

        if rate != sink.sample_rate {
            log::debug!("Appending aresample {} -> {} Hz for the sink", rate, sink.sample_rate);
            let mut resample = Aresample::new(sink.sample_rate)?;
            resample.configure(rate, channels, config)?;
            filters.push(Box::new(resample));
        }

        let chain: Vec<&str> = filters.iter().map(|f| f.name()).collect();
        log::info!(
            "Filter graph: {} {} Hz (tb {}) -> [{}] -> {} {} Hz",
            source.format,
            source.sample_rate,
            source.time_base,
            chain.join(","),
            sink.format,
            sink.sample_rate
        );

        Ok(Self { source, sink, filters, outputs: VecDeque::new(), next_pts: 0, eof: false })
    }

    pub fn sink(&self) -> &BufferSinkParams {
        &self.sink
    }

    /// Feed one decoded frame, or `None` to signal end of stream
    pub fn push(&mut self, frame: Option<Frame>) -> Result<()> {
        if self.eof {
            return Err(DecodeAudioError::filter_graph("Frame pushed after end of stream"));
        }

        let Some(frame) = frame else {
            self.eof = true;
            for i in 0..self.filters.len() {
                if let Some(tail) = self.filters[i].flush()? {
                    let block = self.run(i + 1, tail)?;
                    self.emit(block)?;
                }
            }
            return Ok(());
        };

        if frame.format != self.source.format || frame.channels() != self.source.layout.count() {
            return Err(DecodeAudioError::filter_graph(format!(
                "Frame ({}, {} ch) does not match source ({}, {} ch)",
                frame.format,
                frame.channels(),
                self.source.format,
                self.source.layout.count()
            )));
        }

        let block = Block::new(frame.sample_rate, frame.to_unit_planes());
        let block = self.run(0, block)?;
        self.emit(block)
    }

    pub fn pull(&mut self) -> Pull {
        match self.outputs.pop_front() {
            Some(frame) => Pull::Frame(frame),
            None if self.eof => Pull::Eof,
            None => Pull::Again,
        }
    }

    fn run(&mut self, start: usize, mut block: Block) -> Result<Block> {
        for filter in self.filters.iter_mut().skip(start) {
            block = filter.filter(block)?;
        }
        Ok(block)
    }

    fn emit(&mut self, block: Block) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        if block.channels() != self.sink.layout.count() {
            return Err(DecodeAudioError::filter_graph(format!(
                "Sink expects {} channels, chain produced {}",
                self.sink.layout.count(),
                block.channels()
            )));
        }

        let BufferSinkParams { sample_rate, format, .. } = self.sink;
        let frame = Frame::from_unit_planes(&block.planes, format, sample_rate, self.next_pts);
        self.next_pts += frame.sample_count() as u64;
        self.outputs.push_back(frame);
        Ok(())
    }
}

impl std::fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain: Vec<&str> = self.filters.iter().map(|filter| filter.name()).collect();
        f.debug_struct("FilterGraph")
            .field("source", &self.source)
            .field("sink", &self.sink)
            .field("chain", &chain)
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::lookup_token;
    use crate::error::ErrorKind;

    fn mono() -> Channels {
        Channels::FRONT_LEFT
    }

    fn source(token: &str, rate: u32) -> BufferSourceParams {
        BufferSourceParams {
            sample_rate: rate,
            format: lookup_token(token).unwrap(),
            layout: mono(),
            time_base: TimeBase::new(1, rate),
        }
    }

    fn sink(token: &str, rate: u32) -> BufferSinkParams {
        BufferSinkParams { sample_rate: rate, format: lookup_token(token).unwrap(), layout: mono() }
    }

    fn build(
        source: BufferSourceParams,
        sink: BufferSinkParams,
        expression: &str,
    ) -> Result<FilterGraph> {
        FilterGraph::build(source, sink, expression, &ResamplerConfig::default())
    }

    fn drain(graph: &mut FilterGraph) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Pull::Frame(frame) = graph.pull() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_parse_chain() {
        let chain = parse_chain("volume=volume=3.0, aresample=16000").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "volume");
        assert_eq!(chain[0].args.get("volume", 0), Some("3.0"));
        assert_eq!(chain[1].args.positional, vec!["16000"]);

        assert!(parse_chain("").is_err());
        assert!(parse_chain("anull,,anull").is_err());
        assert!(parse_chain("[in]anull[out]").is_err());
        assert!(parse_chain("anull;anull").is_err());
    }

    #[test]
    fn test_build_rejects_unknown_filter() {
        let err = build(source("s16le", 8000), sink("s16le", 8000), "reverb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterGraph);
    }

    #[test]
    fn test_anull_converts_format() {
        let mut graph = build(source("f32le", 8000), sink("s16be", 8000), "anull").unwrap();
        let f32le = lookup_token("f32le").unwrap();
        let input = Frame::from_unit_planes(&[vec![0.5, -0.25]], f32le, 8000, 0);
        graph.push(Some(input)).unwrap();

        let frame = match graph.pull() {
            Pull::Frame(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        };
        assert_eq!(frame.format.token(), "s16be");
        assert_eq!(frame.plane(0), &[0x40, 0x00, 0xE0, 0x00]);
        assert!(matches!(graph.pull(), Pull::Again));

        graph.push(None).unwrap();
        assert!(matches!(graph.pull(), Pull::Eof));
        assert!(graph.push(None).is_err());
    }

    #[test]
    fn test_source_format_mismatch() {
        let mut graph = build(source("s16le", 8000), sink("s16le", 8000), "anull").unwrap();
        let wrong = Frame::from_unit_planes(&[vec![0.0]], lookup_token("f32le").unwrap(), 8000, 0);
        assert!(graph.push(Some(wrong)).is_err());
    }

    #[test]
    fn test_resample_auto_inserted() {
        let mut graph = build(source("f32le", 16000), sink("f32le", 8000), "volume=0.5").unwrap();
        let format = lookup_token("f32le").unwrap();
        for i in 0..16 {
            let frame = Frame::from_unit_planes(&[vec![0.2; 1000]], format, 16000, i * 1000);
            graph.push(Some(frame)).unwrap();
        }
        graph.push(None).unwrap();

        let frames = drain(&mut graph);
        let total: usize = frames.iter().map(Frame::sample_count).sum();
        assert_eq!(total, 8000);
        assert!(frames.iter().all(|f| f.sample_rate == 8000));
        // pts counts output samples
        assert_eq!(frames.last().map(|f| f.pts as usize + f.sample_count()), Some(8000));
    }
}
