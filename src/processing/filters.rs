//! Audio filters available in filter expressions
//!
//! Filters run on blocks of normalized planar `f64` samples. The buffer
//! source and sink in [`super::filter_graph`] do the conversion from and to
//! the stream's sample format.

use rubato::{Resampler, SincFixedIn};
use crate::config::ResamplerConfig;
use crate::error::{DecodeAudioError, Result};

/// Planar block of normalized samples at a given rate
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub sample_rate: u32,
    pub planes: Vec<Vec<f64>>,
}

impl Block {
    pub fn new(sample_rate: u32, planes: Vec<Vec<f64>>) -> Self {
        Self { sample_rate, planes }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn len(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arguments of one filter instance: `name=a:b:key=value`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterArgs {
    pub positional: Vec<String>,
    pub named: Vec<(String, String)>,
}

impl FilterArgs {
    pub fn parse(args: &str) -> Self {
        let mut parsed = Self::default();
        if args.is_empty() {
            return parsed;
        }
        for item in args.split(':') {
            match item.split_once('=') {
                Some((key, value)) => {
                    parsed.named.push((key.trim().to_string(), value.trim().to_string()))
                }
                None => parsed.positional.push(item.trim().to_string()),
            }
        }
        parsed
    }

    /// Value given by `key`, or the `position`-th positional value
    pub fn get(&self, key: &str, position: usize) -> Option<&str> {
        self.named
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.positional.get(position).map(String::as_str))
    }

    fn check_keys(&self, filter: &str, known: &[&str]) -> Result<()> {
        match self.named.iter().find(|(key, _)| !known.contains(&key.as_str())) {
            Some((key, _)) => Err(DecodeAudioError::filter_graph(format!(
                "Option '{}' not found for filter '{}'",
                key, filter
            ))),
            None => Ok(()),
        }
    }
}

pub trait AudioFilter {
    fn name(&self) -> &'static str;

    /// Rate of the blocks this filter emits for a given input rate
    fn output_rate(&self, input_rate: u32) -> u32 {
        input_rate
    }

    /// Called once with the negotiated input before any block arrives
    fn configure(
        &mut self,
        _input_rate: u32,
        _channels: usize,
        _config: &ResamplerConfig,
    ) -> Result<()> {
        Ok(())
    }

    fn filter(&mut self, block: Block) -> Result<Block>;

    /// Emit whatever is still buffered at end of stream
    fn flush(&mut self) -> Result<Option<Block>> {
        Ok(None)
    }
}

/// Instantiate a filter by name
pub fn create(name: &str, args: &FilterArgs) -> Result<Box<dyn AudioFilter>> {
    match name {
        "anull" => {
            args.check_keys(name, &[])?;
            if !args.positional.is_empty() {
                return Err(DecodeAudioError::filter_graph("anull takes no arguments"));
            }
            Ok(Box::new(Anull))
        }
        "volume" => Ok(Box::new(Volume::from_args(args)?)),
        "aresample" => Ok(Box::new(Aresample::from_args(args)?)),
        _ => Err(DecodeAudioError::filter_graph(format!("No such filter: '{}'", name))),
    }
}

/// Passes audio through unchanged
#[derive(Debug, Default)]
pub struct Anull;

impl AudioFilter for Anull {
    fn name(&self) -> &'static str {
        "anull"
    }

    fn filter(&mut self, block: Block) -> Result<Block> {
        Ok(block)
    }
}

/// Scales every sample by a fixed gain
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    gain: f64,
}

impl Volume {
    pub fn new(gain: f64) -> Result<Self> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(DecodeAudioError::filter_graph(format!("Invalid volume: {}", gain)));
        }
        Ok(Self { gain })
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// `volume=0.5`, `volume=volume=0.5` or `volume=-6dB`
    fn from_args(args: &FilterArgs) -> Result<Self> {
        args.check_keys("volume", &["volume"])?;
        let value = args.get("volume", 0).unwrap_or("1.0");
        let invalid = || DecodeAudioError::filter_graph(format!("Invalid volume: '{}'", value));

        let gain = match value.strip_suffix("dB").or_else(|| value.strip_suffix("db")) {
            Some(db) => {
                let db: f64 = db.trim().parse().map_err(|_| invalid())?;
                10f64.powf(db / 20.0)
            }
            None => value.parse().map_err(|_| invalid())?,
        };
        Self::new(gain)
    }
}

impl AudioFilter for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn filter(&mut self, mut block: Block) -> Result<Block> {
        for plane in &mut block.planes {
            for sample in plane.iter_mut() {
                *sample *= self.gain;
            }
        }
        Ok(block)
    }
}

struct ResampleState {
    resampler: SincFixedIn<f64>,
    pending: Vec<Vec<f64>>,
    /// Leading output frames still to discard
    delay: usize,
    ratio: f64,
    frames_in: u64,
    frames_out: u64,
}

impl ResampleState {
    /// Append resampler output, dropping the filter delay and stopping
    /// at `limit` total output frames when given
    fn emit(&mut self, produced: Vec<Vec<f64>>, out: &mut [Vec<f64>], limit: Option<u64>) {
        let len = produced.first().map_or(0, Vec::len);
        let skip = self.delay.min(len);
        self.delay -= skip;

        let mut take = len - skip;
        if let Some(limit) = limit {
            take = take.min(limit.saturating_sub(self.frames_out) as usize);
        }
        for (dst, src) in out.iter_mut().zip(produced.iter()) {
            dst.extend_from_slice(&src[skip..skip + take]);
        }
        self.frames_out += take as u64;
    }
}

/// Sample rate conversion through a windowed-sinc resampler
pub struct Aresample {
    target: u32,
    input_rate: u32,
    state: Option<ResampleState>,
}

impl Aresample {
    pub fn new(target: u32) -> Result<Self> {
        if target == 0 {
            return Err(DecodeAudioError::filter_graph("Output sample rate must be positive"));
        }
        Ok(Self { target, input_rate: 0, state: None })
    }

    /// `aresample=16000` or `aresample=osr=16000`
    fn from_args(args: &FilterArgs) -> Result<Self> {
        args.check_keys("aresample", &["osr", "out_sample_rate"])?;
        let value = args
            .get("osr", 0)
            .or_else(|| args.get("out_sample_rate", usize::MAX))
            .ok_or_else(|| {
                DecodeAudioError::filter_graph("aresample needs an output sample rate")
            })?;
        let target = value.parse::<u32>().map_err(|_| {
            DecodeAudioError::filter_graph(format!("Invalid sample rate: '{}'", value))
        })?;
        Self::new(target)
    }

    pub fn target(&self) -> u32 {
        self.target
    }
}

impl AudioFilter for Aresample {
    fn name(&self) -> &'static str {
        "aresample"
    }

    fn output_rate(&self, _input_rate: u32) -> u32 {
        self.target
    }

    fn configure(
        &mut self,
        input_rate: u32,
        channels: usize,
        config: &ResamplerConfig,
    ) -> Result<()> {
        self.input_rate = input_rate;
        if input_rate == self.target {
            self.state = None;
            return Ok(());
        }

        let ratio = self.target as f64 / input_rate as f64;
        let resampler = SincFixedIn::<f64>::new(
            ratio,
            1.0,
            config.interpolation_parameters(),
            config.chunk_size,
            channels,
        )?;
        let delay = resampler.output_delay();
        log::debug!(
            "aresample {} -> {} Hz, chunk {} frames, delay {} frames",
            input_rate, self.target, config.chunk_size, delay
        );

        self.state = Some(ResampleState {
            resampler,
            pending: vec![Vec::new(); channels],
            delay,
            ratio,
            frames_in: 0,
            frames_out: 0,
        });
        Ok(())
    }

    fn filter(&mut self, block: Block) -> Result<Block> {
        let Some(state) = self.state.as_mut() else {
            return Ok(Block { sample_rate: self.target, ..block });
        };
        if block.channels() != state.pending.len() {
            return Err(DecodeAudioError::filter_graph(format!(
                "aresample configured for {} channels, got {}",
                state.pending.len(),
                block.channels()
            )));
        }

        state.frames_in += block.len() as u64;
        for (pending, plane) in state.pending.iter_mut().zip(block.planes) {
            pending.extend(plane);
        }

        let mut out = vec![Vec::new(); state.pending.len()];
        loop {
            let needed = state.resampler.input_frames_next();
            if state.pending.first().map_or(0, Vec::len) < needed {
                break;
            }
            let chunk: Vec<&[f64]> = state.pending.iter().map(|p| &p[..needed]).collect();
            let produced = state.resampler.process(&chunk[..], None)?;
            for pending in state.pending.iter_mut() {
                pending.drain(..needed);
            }
            state.emit(produced, &mut out, None);
        }

        Ok(Block::new(self.target, out))
    }

    fn flush(&mut self) -> Result<Option<Block>> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };

        let expected = (state.frames_in as f64 * state.ratio).round() as u64;
        let mut out = vec![Vec::new(); state.pending.len()];

        if state.pending.first().is_some_and(|p| !p.is_empty()) {
            let produced = state.resampler.process_partial(Some(state.pending.as_slice()), None)?;
            for pending in state.pending.iter_mut() {
                pending.clear();
            }
            state.emit(produced, &mut out, Some(expected));
        }

        while state.frames_out < expected {
            let produced = state.resampler.process_partial(None::<&[Vec<f64>]>, None)?;
            if produced.first().map_or(true, Vec::is_empty) {
                break;
            }
            state.emit(produced, &mut out, Some(expected));
        }

        log::debug!(
            "aresample flushed: {} frames in, {} frames out",
            state.frames_in, state.frames_out
        );
        Ok(Some(Block::new(self.target, out)))
    }
}

impl std::fmt::Debug for Aresample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aresample")
            .field("input_rate", &self.input_rate)
            .field("target", &self.target)
            .field("active", &self.state.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sine(len: usize, rate: u32, freq: f64) -> Vec<f64> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = FilterArgs::parse("16000:osr=8000");
        assert_eq!(args.positional, vec!["16000"]);
        assert_eq!(args.get("osr", 0), Some("8000"));
        assert_eq!(FilterArgs::parse(""), FilterArgs::default());
    }

    #[test]
    fn test_create_unknown() {
        match create("echo", &FilterArgs::default()) {
            Ok(filter) => panic!("unexpected filter {}", filter.name()),
            Err(err) => assert_eq!(err.kind(), ErrorKind::FilterGraph),
        }
        assert!(create("anull", &FilterArgs::parse("x")).is_err());
    }

    #[test]
    fn test_volume_parsing() {
        let v = Volume::from_args(&FilterArgs::parse("3.0")).unwrap();
        assert_eq!(v.gain(), 3.0);
        let v = Volume::from_args(&FilterArgs::parse("volume=0.5")).unwrap();
        assert_eq!(v.gain(), 0.5);
        let v = Volume::from_args(&FilterArgs::parse("-20dB")).unwrap();
        assert!((v.gain() - 0.1).abs() < 1e-12);

        assert!(Volume::from_args(&FilterArgs::parse("loud")).is_err());
        assert!(Volume::from_args(&FilterArgs::parse("-1")).is_err());
        assert!(Volume::from_args(&FilterArgs::parse("gain=2")).is_err());
    }

    #[test]
    fn test_volume_scales() {
        let mut v = Volume::new(2.0).unwrap();
        let out = v.filter(Block::new(8000, vec![vec![0.25, -0.1]])).unwrap();
        assert_eq!(out.planes, vec![vec![0.5, -0.2]]);
        assert!(v.flush().unwrap().is_none());
    }

    #[test]
    fn test_aresample_args() {
        assert_eq!(Aresample::from_args(&FilterArgs::parse("16000")).unwrap().target(), 16000);
        assert_eq!(Aresample::from_args(&FilterArgs::parse("osr=8000")).unwrap().target(), 8000);
        assert!(Aresample::from_args(&FilterArgs::default()).is_err());
        assert!(Aresample::from_args(&FilterArgs::parse("0")).is_err());
        assert!(Aresample::from_args(&FilterArgs::parse("fast")).is_err());
    }

    #[test]
    fn test_aresample_same_rate_passthrough() {
        let mut r = Aresample::new(16000).unwrap();
        r.configure(16000, 1, &ResamplerConfig::default()).unwrap();
        let block = Block::new(16000, vec![vec![0.1, 0.2, 0.3]]);
        assert_eq!(r.filter(block.clone()).unwrap(), block);
        assert!(r.flush().unwrap().is_none());
    }

    #[test]
    fn test_aresample_output_length() {
        let config = ResamplerConfig::default();
        let mut r = Aresample::new(16000).unwrap();
        r.configure(44100, 2, &config).unwrap();
        assert_eq!(r.output_rate(44100), 16000);

        let input = sine(44100, 44100, 440.0);
        let mut total = 0;
        for chunk in input.chunks(1000) {
            let out = r.filter(Block::new(44100, vec![chunk.to_vec(), chunk.to_vec()])).unwrap();
            assert_eq!(out.sample_rate, 16000);
            assert_eq!(out.channels(), 2);
            total += out.len();
        }
        total += r.flush().unwrap().unwrap().len();
        assert_eq!(total, 16000);
    }

    #[test]
    fn test_aresample_preserves_level() {
        let mut r = Aresample::new(8000).unwrap();
        r.configure(16000, 1, &ResamplerConfig::default()).unwrap();
        let input = sine(16000, 16000, 200.0);
        let mut out = r.filter(Block::new(16000, vec![input])).unwrap().planes.remove(0);
        out.extend(r.flush().unwrap().unwrap().planes.remove(0));
        assert_eq!(out.len(), 8000);

        let peak = out[1000..7000].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak {}", peak);
    }

    #[test]
    fn test_aresample_channel_mismatch() {
        let mut r = Aresample::new(8000).unwrap();
        r.configure(16000, 2, &ResamplerConfig::default()).unwrap();
        assert!(r.filter(Block::new(16000, vec![vec![0.0; 10]])).is_err());
    }
}
