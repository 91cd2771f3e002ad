//! Synthetic WAV fixtures for tests

use std::io::Cursor;
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_FLAC};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Normalized tone value; each channel gets its own frequency
pub fn tone(i: usize, channel: usize, rate: u32) -> f64 {
    let freq = 440.0 + 110.0 * channel as f64;
    0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin()
}

/// The 16-bit sample `tone_wav` writes at position `i`
pub fn tone_i16(i: usize, channel: usize, rate: u32) -> i16 {
    (tone(i, channel, rate) * 32767.0).round() as i16
}

pub fn int_spec(channels: u16, sample_rate: u32, bits: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: hound::SampleFormat::Int,
    }
}

pub fn float_spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

/// In-memory WAV holding `frames` frames of [`tone`]
pub fn tone_wav(spec: hound::WavSpec, frames: usize) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for ch in 0..spec.channels as usize {
                let v = tone(i, ch, spec.sample_rate);
                let scaled = |max: f64| (v * max).round() as i32;
                let written = match (spec.sample_format, spec.bits_per_sample) {
                    (hound::SampleFormat::Float, _) => writer.write_sample(v as f32),
                    (hound::SampleFormat::Int, 8) => writer.write_sample(scaled(127.0) as i8),
                    (hound::SampleFormat::Int, 16) => {
                        writer.write_sample(tone_i16(i, ch, spec.sample_rate))
                    }
                    (hound::SampleFormat::Int, 24) => writer.write_sample(scaled(8388607.0)),
                    (hound::SampleFormat::Int, _) => writer.write_sample(scaled(i32::MAX as f64)),
                };
                written.unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// IEEE float WAV with 64-bit samples; hound cannot write these
pub fn f64_wav(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
    let block_align = channels as u32 * 8;
    let data_len = frames as u32 * block_align;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&3u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&64u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        for ch in 0..channels as usize {
            out.extend_from_slice(&tone(i, ch, sample_rate).to_le_bytes());
        }
    }
    out
}

/// Probe a WAV directly, returning the reader, track id and codec parameters
pub fn open_reader(wav: Vec<u8>) -> (Box<dyn FormatReader>, u32, CodecParameters) {
    let options = MediaSourceStreamOptions::default();
    let stream = MediaSourceStream::new(Box::new(Cursor::new(wav)), options);
    let mut hint = Hint::new();
    hint.with_extension("wav");
    let probed = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .unwrap();
    let track = probed.format.default_track().unwrap();
    let (id, params) = (track.id, track.codec_params.clone());
    (probed.format, id, params)
}

/// FLAC codec parameters carrying a STREAMINFO block, for driving the
/// decoder with hand-made packets
pub fn flac_params(sample_rate: u32, channels: u8, bits: u8, n_frames: u64) -> CodecParameters {
    let mut info = Vec::with_capacity(34);
    // min/max block length, then unknown min/max frame size
    info.extend_from_slice(&4096u16.to_be_bytes());
    info.extend_from_slice(&4096u16.to_be_bytes());
    info.extend_from_slice(&[0u8; 6]);
    // rate:20 channels-1:3 bits-1:5 total:36
    let packed = (sample_rate as u64) << 44
        | ((channels - 1) as u64) << 41
        | ((bits - 1) as u64) << 36
        | (n_frames & 0xF_FFFF_FFFF);
    info.extend_from_slice(&packed.to_be_bytes());
    info.extend_from_slice(&[0u8; 16]);

    let mut params = CodecParameters::new();
    params
        .for_codec(CODEC_TYPE_FLAC)
        .with_sample_rate(sample_rate)
        .with_bits_per_sample(bits as u32)
        .with_n_frames(n_frames)
        .with_extra_data(info.into_boxed_slice());
    params
}
