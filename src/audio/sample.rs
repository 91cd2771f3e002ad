//! Byte-level sample encoding shared by frames, the filter graph and tensors

use crate::audio::format::{ByteOrder, Element, PcmFormat};

/// Primitive sample types carried by the format table.
///
/// `to_unit`/`from_unit` map to and from the normalized `[-1.0, 1.0)`
/// range the filter graph works in.
pub trait PcmSample: Copy {
    const ELEMENT: Element;

    fn read(bytes: &[u8], order: ByteOrder) -> Self;
    fn write(self, order: ByteOrder, out: &mut Vec<u8>);
    fn to_unit(self) -> f64;
    fn from_unit(value: f64) -> Self;
}

macro_rules! pcm_sample {
    ($ty:ty, $element:expr, $to_unit:expr, $from_unit:expr) => {
        impl PcmSample for $ty {
            const ELEMENT: Element = $element;

            fn read(bytes: &[u8], order: ByteOrder) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                match order {
                    ByteOrder::Little => <$ty>::from_le_bytes(raw),
                    ByteOrder::Big => <$ty>::from_be_bytes(raw),
                }
            }

            fn write(self, order: ByteOrder, out: &mut Vec<u8>) {
                match order {
                    ByteOrder::Little => out.extend_from_slice(&self.to_le_bytes()),
                    ByteOrder::Big => out.extend_from_slice(&self.to_be_bytes()),
                }
            }

            fn to_unit(self) -> f64 {
                ($to_unit)(self)
            }

            fn from_unit(value: f64) -> Self {
                ($from_unit)(value)
            }
        }
    };
}

pcm_sample!(u8, Element::U8,
    |v: u8| (f64::from(v) - 128.0) / 128.0,
    |x: f64| ((x * 128.0).round() + 128.0).clamp(0.0, 255.0) as u8);
pcm_sample!(i16, Element::S16,
    |v: i16| f64::from(v) / 32768.0,
    |x: f64| (x * 32768.0).round().clamp(-32768.0, 32767.0) as i16);
pcm_sample!(i32, Element::S32,
    |v: i32| f64::from(v) / 2147483648.0,
    |x: f64| (x * 2147483648.0).round().clamp(-2147483648.0, 2147483647.0) as i32);
pcm_sample!(f32, Element::F32, |v: f32| f64::from(v), |x: f64| x as f32);
pcm_sample!(f64, Element::F64, |v: f64| v, |x: f64| x);

fn read_plane<T: PcmSample>(bytes: &[u8], order: ByteOrder) -> Vec<f64> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(|raw| T::read(raw, order).to_unit())
        .collect()
}

fn write_plane<T: PcmSample>(values: &[f64], order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * std::mem::size_of::<T>());
    for &value in values {
        T::from_unit(value).write(order, &mut out);
    }
    out
}

/// Decode one plane of encoded samples into normalized values
pub fn decode_plane(bytes: &[u8], format: PcmFormat) -> Vec<f64> {
    let order = format.byte_order();
    match format.element() {
        Element::U8 => read_plane::<u8>(bytes, order),
        Element::S16 => read_plane::<i16>(bytes, order),
        Element::S32 => read_plane::<i32>(bytes, order),
        Element::F32 => read_plane::<f32>(bytes, order),
        Element::F64 => read_plane::<f64>(bytes, order),
    }
}

/// Encode normalized values into one plane of `format` samples
pub fn encode_plane(values: &[f64], format: PcmFormat) -> Vec<u8> {
    let order = format.byte_order();
    match format.element() {
        Element::U8 => write_plane::<u8>(values, order),
        Element::S16 => write_plane::<i16>(values, order),
        Element::S32 => write_plane::<i32>(values, order),
        Element::F32 => write_plane::<f32>(values, order),
        Element::F64 => write_plane::<f64>(values, order),
    }
}
