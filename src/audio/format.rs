//! Sample format table and output format negotiation

use symphonia::core::sample::SampleFormat;
use crate::error::{DecodeAudioError, Result};
use crate::tensor::{DataType, DataTypeCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { ByteOrder::Big } else { ByteOrder::Little }
    }
}

/// Element types the table knows how to carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    U8,
    S16,
    S32,
    F32,
    F64,
}

#[derive(Debug)]
pub struct SampleFormatEntry {
    pub native: SampleFormat,
    pub element: Element,
    pub token_be: &'static str,
    pub token_le: &'static str,
    pub dtype: DataType,
}

const fn dtype(code: DataTypeCode, bits: u8) -> DataType {
    DataType { code, bits, lanes: 1 }
}

const fn entry(
    native: SampleFormat,
    element: Element,
    token_be: &'static str,
    token_le: &'static str,
    dtype: DataType,
) -> SampleFormatEntry {
    SampleFormatEntry { native, element, token_be, token_le, dtype }
}

pub static SAMPLE_FORMATS: [SampleFormatEntry; 5] = [
    entry(SampleFormat::U8, Element::U8, "u8", "u8", dtype(DataTypeCode::UInt, 8)),
    entry(SampleFormat::S16, Element::S16, "s16be", "s16le", dtype(DataTypeCode::Int, 16)),
    entry(SampleFormat::S32, Element::S32, "s32be", "s32le", dtype(DataTypeCode::Int, 32)),
    entry(SampleFormat::F32, Element::F32, "f32be", "f32le", dtype(DataTypeCode::Float, 32)),
    entry(SampleFormat::F64, Element::F64, "f64be", "f64le", dtype(DataTypeCode::Float, 64)),
];

/// `SampleFormat` has no `PartialEq`; compare by variant
pub fn same_sample_format(a: SampleFormat, b: SampleFormat) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}

impl PartialEq for SampleFormatEntry {
    fn eq(&self, other: &Self) -> bool {
        same_sample_format(self.native, other.native)
            && self.element == other.element
            && self.token_be == other.token_be
            && self.token_le == other.token_le
            && self.dtype == other.dtype
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    Packed,
    Planar,
}

/// Sample format as produced by the decoder
#[derive(Debug, Clone, Copy)]
pub struct NativeFormat {
    pub sample: SampleFormat,
    pub layout: SampleLayout,
}

impl PartialEq for NativeFormat {
    fn eq(&self, other: &Self) -> bool {
        same_sample_format(self.sample, other.sample) && self.layout == other.layout
    }
}

impl NativeFormat {
    pub fn planar(sample: SampleFormat) -> Self {
        Self { sample, layout: SampleLayout::Planar }
    }

    pub fn packed(self) -> Self {
        Self { layout: SampleLayout::Packed, ..self }
    }

    pub fn is_planar(&self) -> bool {
        self.layout == SampleLayout::Planar
    }
}

/// A table entry together with the byte order samples are stored in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmFormat {
    entry: &'static SampleFormatEntry,
    byte_order: ByteOrder,
}

impl PcmFormat {
    pub fn native(entry: &'static SampleFormatEntry) -> Self {
        Self { entry, byte_order: ByteOrder::native() }
    }

    pub fn entry(&self) -> &'static SampleFormatEntry {
        self.entry
    }

    pub fn element(&self) -> Element {
        self.entry.element
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn token(&self) -> &'static str {
        match self.byte_order {
            ByteOrder::Big => self.entry.token_be,
            ByteOrder::Little => self.entry.token_le,
        }
    }

    pub fn dtype(&self) -> DataType {
        self.entry.dtype
    }

    pub fn itemsize(&self) -> usize {
        self.entry.dtype.itemsize()
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

pub fn lookup_native(sample: SampleFormat) -> Option<&'static SampleFormatEntry> {
    SAMPLE_FORMATS.iter().find(|entry| same_sample_format(entry.native, sample))
}

pub fn lookup_token(token: &str) -> Option<PcmFormat> {
    SAMPLE_FORMATS.iter().find_map(|entry| {
        if entry.token_le == entry.token_be {
            (token == entry.token_le).then(|| PcmFormat::native(entry))
        } else if token == entry.token_le {
            Some(PcmFormat { entry, byte_order: ByteOrder::Little })
        } else if token == entry.token_be {
            Some(PcmFormat { entry, byte_order: ByteOrder::Big })
        } else {
            None
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Negotiated {
    pub input: PcmFormat,
    pub output: PcmFormat,
}

/// Resolve input and output formats from the decoder's native format and
/// an optional requested output token (empty means "same as input").
pub fn negotiate(native: NativeFormat, requested: &str) -> Result<Negotiated> {
    let native = if native.is_planar() {
        log::debug!("Decoder produces planar {:?}, collapsing to packed", native.sample);
        native.packed()
    } else {
        native
    };

    let entry = lookup_native(native.sample).ok_or_else(|| {
        let message = format!("Could not deduce format from {:?}", native.sample);
        DecodeAudioError::format_negotiation(message)
    })?;
    let input = PcmFormat::native(entry);

    let output = if requested.is_empty() {
        input
    } else {
        lookup_token(requested).ok_or_else(|| {
            let message = format!("Unsupported output format: {}", requested);
            DecodeAudioError::format_negotiation(message)
        })?
    };

    Ok(Negotiated { input, output })
}
