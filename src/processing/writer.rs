//! Interleaved copy of frames into the output buffer

use crate::audio::Frame;

/// Copies samples frame after frame into a fixed output buffer, channel
/// inner. Never writes past the end; samples that do not fit are counted
/// and discarded.
#[derive(Debug)]
pub struct SampleWriter<'b> {
    buffer: &'b mut [u8],
    itemsize: usize,
    cursor: usize,
    dropped: u64,
}

impl<'b> SampleWriter<'b> {
    pub fn new(buffer: &'b mut [u8], itemsize: usize) -> Self {
        Self { buffer, itemsize, cursor: 0, dropped: 0 }
    }

    /// Bytes written so far
    pub fn written(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Samples discarded for lack of room
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Append one frame; returns the number of samples written. A frame
    /// whose sample width differs from the writer's is dropped whole.
    pub fn write_frame(&mut self, frame: &Frame) -> usize {
        let itemsize = self.itemsize;
        let channels = frame.channels();
        let total = frame.sample_count() * channels;
        let writable = if itemsize == 0 || frame.format.itemsize() != itemsize {
            0
        } else {
            total.min(self.remaining() / itemsize)
        };

        for n in 0..writable {
            let (i, ch) = (n / channels, n % channels);
            let src = &frame.plane(ch)[i * itemsize..(i + 1) * itemsize];
            self.buffer[self.cursor..self.cursor + itemsize].copy_from_slice(src);
            self.cursor += itemsize;
        }

        if writable < total {
            self.dropped += (total - writable) as u64;
        }
        writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::lookup_token;

    fn stereo(token: &str, left: &[f64], right: &[f64]) -> Frame {
        let format = lookup_token(token).unwrap();
        Frame::from_unit_planes(&[left.to_vec(), right.to_vec()], format, 8000, 0)
    }

    fn stereo_s16(left: &[f64], right: &[f64]) -> Frame {
        stereo("s16le", left, right)
    }

    #[test]
    fn test_interleaves_channels() {
        let mut out = vec![0u8; 8];
        let mut writer = SampleWriter::new(&mut out, 2);
        let unit = 1.0 / 32768.0;
        let written = writer.write_frame(&stereo_s16(&[unit, 2.0 * unit], &[-unit, -2.0 * unit]));
        assert_eq!(written, 4);
        assert_eq!(writer.remaining(), 0);
        assert_eq!(writer.dropped(), 0);
        assert_eq!(out, vec![1, 0, 0xFF, 0xFF, 2, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn test_stops_at_capacity() {
        let mut out = vec![0xAAu8; 7];
        let mut writer = SampleWriter::new(&mut out[..6], 2);
        writer.write_frame(&stereo_s16(&[0.0, 0.0], &[0.0, 0.0]));
        assert_eq!(writer.written(), 6);
        assert_eq!(writer.dropped(), 1);

        assert_eq!(writer.write_frame(&stereo_s16(&[0.0], &[0.0])), 0);
        assert_eq!(writer.dropped(), 3);
        // canary past the slice is untouched
        assert_eq!(out[6], 0xAA);
        assert!(out[..6].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sample_width_mismatch_is_dropped() {
        let mut out = vec![0x11u8; 16];
        let mut writer = SampleWriter::new(&mut out, 4);
        // two-byte samples into a four-byte writer
        assert_eq!(writer.write_frame(&stereo_s16(&[0.5, 0.5], &[0.5, 0.5])), 0);
        assert_eq!(writer.dropped(), 4);
        assert_eq!(writer.written(), 0);

        // wider samples are dropped as well
        assert_eq!(writer.write_frame(&stereo("f64le", &[0.5], &[0.5])), 0);
        assert_eq!(writer.dropped(), 6);
        assert!(out.iter().all(|&b| b == 0x11));
    }
}
