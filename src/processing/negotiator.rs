//! Stream probing and parameter negotiation
//!
//! Opens the input, selects the audio track, opens its decoder and works out
//! what the decoder will actually produce before any output is allocated.

use symphonia::core::audio::Channels;
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, Track};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::TimeBase;
use crate::audio::format::{lookup_native, same_sample_format, NativeFormat};
use crate::audio::source::{InputHint, Source};
use crate::error::{DecodeAudioError, Result};
use crate::processing::decoder::DecoderContext;

/// What the prober and decoder report about the selected stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub track_id: u32,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: Channels,
    pub time_base: TimeBase,
    /// Stream length in sample frames
    pub n_frames: u64,
    pub native: NativeFormat,
}

impl StreamInfo {
    pub fn num_channels(&self) -> usize {
        self.channels.count()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_frames as f64 / self.sample_rate as f64
    }

    /// Output sample count at `output_rate`, rounded down
    pub fn estimate_samples(&self, output_rate: u32) -> u64 {
        (self.n_frames as u128 * output_rate as u128 / self.sample_rate as u128) as u64
    }
}

impl std::fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} Hz, {} ch, {:?}, {:.3}s",
            self.codec,
            self.sample_rate,
            self.num_channels(),
            self.native.sample,
            self.duration_secs()
        )
    }
}

/// An opened stream, ready for the packet loop
pub struct ProbedStream {
    pub format: Box<dyn FormatReader>,
    pub decoder: DecoderContext,
    pub info: StreamInfo,
}

fn is_audio(track: &Track) -> bool {
    track.codec_params.codec != CODEC_TYPE_NULL && track.codec_params.sample_rate.is_some()
}

/// Pick the default track if it is audio, otherwise the first audio track
fn select_track(format: &dyn FormatReader) -> Option<(u32, CodecParameters)> {
    format
        .default_track()
        .filter(|track| is_audio(track))
        .or_else(|| format.tracks().iter().find(|track| is_audio(track)))
        .map(|track| (track.id, track.codec_params.clone()))
}

/// Next packet of `track_id`, skipping other tracks. `None` at end of stream.
pub fn next_packet(format: &mut dyn FormatReader, track_id: u32) -> Result<Option<Packet>> {
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(DecodeAudioError::decode("Stream parameters changed mid-stream"));
            }
            Err(e) => return Err(DecodeAudioError::decode(format!("Could not read packet: {}", e))),
        }
    }
}

/// Decode ahead until the decoder reports its output format. The decoded
/// frames stay queued in the decoder.
fn lookahead(
    format: &mut dyn FormatReader,
    decoder: &mut DecoderContext,
    track_id: u32,
) -> Result<()> {
    while decoder.last_output().is_none() {
        match next_packet(format, track_id)? {
            Some(packet) => decoder.send_packet(Some(&packet))?,
            None => {
                return Err(DecodeAudioError::format_negotiation(
                    "Could not deduce sample format: stream holds no decodable audio",
                ));
            }
        }
    }
    Ok(())
}

/// Open `source`, select its audio stream and open a decoder for it
pub fn probe(source: Source, hint: &InputHint) -> Result<ProbedStream> {
    let mut probe_hint = hint.to_probe_hint();
    if hint.extension.is_none() {
        if let Some(ext) = source.extension() {
            probe_hint.with_extension(ext);
        }
    }

    let stream = source.open()?;
    let probed = symphonia::default::get_probe()
        .format(&probe_hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| {
            DecodeAudioError::io(format!("Could not find stream information: {}", e))
        })?;
    let mut format = probed.format;

    let (track_id, params) = select_track(format.as_ref())
        .ok_or_else(|| DecodeAudioError::stream_not_found("Could not find audio stream"))?;

    let mut decoder = DecoderContext::open(&params)?;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeAudioError::stream_not_found("Audio stream has no sample rate"))?;

    // container metadata can disagree with the decoder (e.g. sample format
    // reported for an encoded stream); the first decoded buffer is authoritative
    lookahead(format.as_mut(), &mut decoder, track_id)?;
    let Some((native, spec)) = decoder.last_output() else {
        return Err(DecodeAudioError::format_negotiation("Could not deduce sample format"));
    };
    if let Some(declared) = params.sample_format {
        if !same_sample_format(declared, native.sample) {
            log::debug!("Container declares {:?}, decoder produces {:?}", declared, native.sample);
        }
    }

    let channels = match params.channels {
        Some(channels) if channels.count() == spec.channels.count() => channels,
        _ => spec.channels,
    };
    if channels.count() == 0 {
        return Err(DecodeAudioError::stream_not_found("Audio stream has no channels"));
    }

    let n_frames = params
        .n_frames
        .ok_or_else(|| DecodeAudioError::io("Could not estimate stream duration"))?;

    if lookup_native(native.sample).is_none() {
        log::warn!("Decoder output {:?} has no tensor mapping", native.sample);
    }

    let info = StreamInfo {
        track_id,
        codec: decoder.codec_name().to_string(),
        sample_rate,
        channels,
        time_base: params.time_base.unwrap_or_else(|| TimeBase::new(1, sample_rate)),
        n_frames,
        native,
    };
    log::info!("Input stream: {}", info);

    Ok(ProbedStream { format, decoder, info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::processing::decoder::Receive;
    use crate::test_utils;
    use symphonia::core::sample::SampleFormat;

    #[test]
    fn test_probe_wav_info() {
        let wav = test_utils::tone_wav(test_utils::int_spec(2, 44100, 16), 44100);
        let probed = probe(Source::memory(wav), &InputHint::default()).unwrap();
        let info = &probed.info;
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.num_channels(), 2);
        assert_eq!(info.n_frames, 44100);
        assert!(matches!(info.native.sample, SampleFormat::S16));
        assert!((info.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_native_format_matches_first_frame() {
        let cases = [
            test_utils::tone_wav(test_utils::int_spec(1, 8000, 8), 500),
            test_utils::tone_wav(test_utils::int_spec(2, 8000, 32), 500),
            test_utils::tone_wav(test_utils::float_spec(1, 8000), 500),
            test_utils::f64_wav(2, 8000, 500),
        ];
        for wav in cases {
            let mut stream = probe(Source::memory(wav), &InputHint::default()).unwrap();
            let frame = match stream.decoder.receive_frame() {
                Receive::Frame(frame) => frame,
                other => panic!("expected a queued frame, got {:?}", other),
            };
            assert_eq!(frame.format.entry(), lookup_native(stream.info.native.sample).unwrap());
            assert_eq!(frame.channels(), stream.info.num_channels());
        }
    }

    #[test]
    fn test_estimate_samples() {
        let wav = test_utils::tone_wav(test_utils::int_spec(1, 44100, 16), 44100);
        let info = probe(Source::memory(wav), &InputHint::default()).unwrap().info;
        assert_eq!(info.estimate_samples(44100), 44100);
        assert_eq!(info.estimate_samples(16000), 16000);
        assert_eq!(info.estimate_samples(22050), 22050);
    }

    #[test]
    fn test_estimate_rounds_down() {
        let wav = test_utils::tone_wav(test_utils::int_spec(1, 44100, 16), 1000);
        let info = probe(Source::memory(wav), &InputHint::default()).unwrap().info;
        // 1000 * 16000 / 44100 = 362.8
        assert_eq!(info.estimate_samples(16000), 362);
    }

    #[test]
    fn test_garbage_input() {
        let source = Source::memory(vec![0x42u8; 512]);
        match probe(source, &InputHint::default()) {
            Ok(_) => panic!("garbage must not probe"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Io),
        }
    }

    #[test]
    fn test_next_packet_until_eof() {
        let wav = test_utils::tone_wav(test_utils::int_spec(1, 8000, 16), 3000);
        let (mut format, track_id, _) = test_utils::open_reader(wav);
        let mut frames = 0u64;
        while let Some(packet) = next_packet(format.as_mut(), track_id).unwrap() {
            frames += packet.dur();
        }
        assert_eq!(frames, 3000);
    }
}
