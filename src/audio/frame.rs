//! Decoded audio frames
//!
//! A frame always stores one byte plane per channel; the interleaving into
//! the output tensor happens only when samples are copied out.

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::sample::{Sample, SampleFormat};
use crate::audio::format::{self, ByteOrder, NativeFormat, PcmFormat};
use crate::audio::sample::{self, PcmSample};
use crate::error::{DecodeAudioError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub format: PcmFormat,
    pub sample_rate: u32,
    pub pts: u64,
    planes: Vec<Vec<u8>>,
}

/// Native format of a decoded buffer; the engine always decodes planar
pub fn native_format(buffer: &AudioBufferRef<'_>) -> NativeFormat {
    let sample = match buffer {
        AudioBufferRef::U8(_) => SampleFormat::U8,
        AudioBufferRef::U16(_) => SampleFormat::U16,
        AudioBufferRef::U24(_) => SampleFormat::U24,
        AudioBufferRef::U32(_) => SampleFormat::U32,
        AudioBufferRef::S8(_) => SampleFormat::S8,
        AudioBufferRef::S16(_) => SampleFormat::S16,
        AudioBufferRef::S24(_) => SampleFormat::S24,
        AudioBufferRef::S32(_) => SampleFormat::S32,
        AudioBufferRef::F32(_) => SampleFormat::F32,
        AudioBufferRef::F64(_) => SampleFormat::F64,
    };
    NativeFormat::planar(sample)
}

fn collect_planes<T: PcmSample + Sample>(buffer: &AudioBuffer<T>) -> Vec<Vec<u8>> {
    let order = ByteOrder::native();
    (0..buffer.spec().channels.count())
        .map(|ch| {
            let samples = buffer.chan(ch);
            let mut plane = Vec::with_capacity(samples.len() * std::mem::size_of::<T>());
            for &s in samples {
                s.write(order, &mut plane);
            }
            plane
        })
        .collect()
}

impl Frame {
    pub fn new(format: PcmFormat, sample_rate: u32, pts: u64, planes: Vec<Vec<u8>>) -> Self {
        Self { format, sample_rate, pts, planes }
    }

    /// Copy a decoder buffer into a frame in host byte order
    pub fn from_buffer(buffer: &AudioBufferRef<'_>, pts: u64) -> Result<Self> {
        let native = native_format(buffer);
        let unsupported = || {
            let message = format!("Unsupported decoded sample format: {:?}", native.sample);
            DecodeAudioError::format_negotiation(message)
        };

        let planes = match buffer {
            AudioBufferRef::U8(buf) => collect_planes::<u8>(buf),
            AudioBufferRef::S16(buf) => collect_planes::<i16>(buf),
            AudioBufferRef::S32(buf) => collect_planes::<i32>(buf),
            AudioBufferRef::F32(buf) => collect_planes::<f32>(buf),
            AudioBufferRef::F64(buf) => collect_planes::<f64>(buf),
            _ => return Err(unsupported()),
        };
        let entry = format::lookup_native(native.sample).ok_or_else(unsupported)?;

        Ok(Self::new(PcmFormat::native(entry), buffer.spec().rate, pts, planes))
    }

    /// Build a frame from normalized planar values, encoding to `format`
    pub fn from_unit_planes(
        values: &[Vec<f64>],
        format: PcmFormat,
        sample_rate: u32,
        pts: u64,
    ) -> Self {
        let planes = values.iter().map(|plane| sample::encode_plane(plane, format)).collect();
        Self::new(format, sample_rate, pts, planes)
    }

    pub fn to_unit_planes(&self) -> Vec<Vec<f64>> {
        self.planes.iter().map(|plane| sample::decode_plane(plane, self.format)).collect()
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn sample_count(&self) -> usize {
        self.planes.first().map_or(0, |plane| plane.len() / self.format.itemsize())
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    pub fn plane(&self, channel: usize) -> &[u8] {
        &self.planes[channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::lookup_token;
    use symphonia::core::audio::{Channels, SignalSpec};

    fn stereo_spec(rate: u32) -> SignalSpec {
        SignalSpec::new(rate, Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
    }

    #[test]
    fn test_from_buffer_s16() {
        let mut buf = AudioBuffer::<i16>::new(4, stereo_spec(8000));
        buf.render_reserved(Some(3));
        buf.chan_mut(0).copy_from_slice(&[1, 2, 3]);
        buf.chan_mut(1).copy_from_slice(&[-1, -2, -3]);

        let buffer = AudioBufferRef::S16(std::borrow::Cow::Borrowed(&buf));
        let frame = Frame::from_buffer(&buffer, 42).unwrap();
        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.sample_count(), 3);
        assert_eq!(frame.sample_rate, 8000);
        assert_eq!(frame.pts, 42);
        assert_eq!(i16::read(&frame.plane(1)[2..4], ByteOrder::native()), -2);
    }

    #[test]
    fn test_unsupported_buffer() {
        let buf = AudioBuffer::<u16>::new(4, stereo_spec(8000));
        let buffer = AudioBufferRef::U16(std::borrow::Cow::Borrowed(&buf));
        assert!(matches!(native_format(&buffer).sample, SampleFormat::U16));
        assert!(native_format(&buffer).is_planar());
        assert!(Frame::from_buffer(&buffer, 0).is_err());
    }

    #[test]
    fn test_unit_planes_roundtrip_format_change() {
        let f32le = lookup_token("f32le").unwrap();
        let frame = Frame::from_unit_planes(&[vec![0.25, -0.5]], f32le, 16000, 0);
        assert_eq!(frame.sample_count(), 2);
        assert_eq!(frame.to_unit_planes(), vec![vec![0.25, -0.5]]);
        assert!(!frame.is_empty());
    }
}
