//! Output tensor and buffer ownership
//!
//! A tensor is `[num_samples, num_channels]`, row-major, channels inner.
//! Its storage is decided once at construction: either a buffer this crate
//! allocated (`Storage::Owned`, freed by [`OwnedBuffer::release`] or on
//! drop) or a caller buffer it only writes into (`Storage::Borrowed`).

pub mod dlpack;

pub use dlpack::{DLDataType, DLDevice, DLManagedTensor, DLTensor, ManagedTensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataTypeCode {
    Int = 0,
    UInt = 1,
    Float = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    pub code: DataTypeCode,
    pub bits: u8,
    pub lanes: u16,
}

impl DataType {
    pub const fn itemsize(&self) -> usize {
        self.lanes as usize * self.bits as usize / 8
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self.code {
            DataTypeCode::Int => "int",
            DataTypeCode::UInt => "uint",
            DataTypeCode::Float => "float",
        };
        write!(f, "{}{}", code, self.bits)?;
        if self.lanes != 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

/// Zero-initialised buffer owned by a tensor
#[derive(Debug)]
pub struct OwnedBuffer {
    data: Option<Box<[u8]>>,
}

impl OwnedBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self { data: Some(vec![0u8; len].into_boxed_slice()) }
    }

    /// Free the buffer. Returns false if it was already released.
    pub fn release(&mut self) -> bool {
        match self.data.take() {
            Some(data) => {
                log::debug!("Released tensor buffer of {} bytes", data.len());
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.data.as_deref_mut()
    }

    fn take(&mut self) -> Option<Box<[u8]>> {
        self.data.take()
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
pub enum Storage<'a> {
    Empty,
    Owned(OwnedBuffer),
    Borrowed(&'a mut [u8]),
}

#[derive(Debug)]
pub struct Tensor<'a> {
    pub device: Device,
    pub dtype: DataType,
    shape: [i64; 2],
    strides: [i64; 2],
    storage: Storage<'a>,
}

impl<'a> Tensor<'a> {
    fn with_storage(
        dtype: DataType,
        num_samples: usize,
        num_channels: usize,
        storage: Storage<'a>,
    ) -> Self {
        Self {
            device: Device::Cpu,
            dtype,
            shape: [num_samples as i64, num_channels as i64],
            strides: [num_channels as i64, 1],
            storage,
        }
    }

    /// Tensor carrying no data, as returned on failure
    pub fn empty() -> Self {
        let dtype = DataType { code: DataTypeCode::UInt, bits: 8, lanes: 1 };
        Self::with_storage(dtype, 0, 0, Storage::Empty)
    }

    /// Shape and dtype only, for probe-only results
    pub fn metadata(dtype: DataType, num_samples: usize, num_channels: usize) -> Self {
        Self::with_storage(dtype, num_samples, num_channels, Storage::Empty)
    }

    pub fn owned(dtype: DataType, num_samples: usize, num_channels: usize) -> Self {
        let nbytes = num_samples * num_channels * dtype.itemsize();
        let storage = Storage::Owned(OwnedBuffer::zeroed(nbytes));
        Self::with_storage(dtype, num_samples, num_channels, storage)
    }

    /// Wrap a caller buffer. Only whole sample rows that fit are exposed,
    /// so `num_samples` may come out smaller than requested.
    pub fn borrowed(
        dtype: DataType,
        num_samples: usize,
        num_channels: usize,
        buffer: &'a mut [u8],
    ) -> Self {
        let row_bytes = num_channels * dtype.itemsize();
        let fit = if row_bytes == 0 { 0 } else { buffer.len() / row_bytes };
        let rows = if fit < num_samples {
            log::warn!(
                "Output buffer of {} bytes holds {} of {} estimated samples, truncating",
                buffer.len(), fit, num_samples
            );
            fit
        } else {
            num_samples
        };
        let buffer = &mut buffer[..rows * row_bytes];
        Self::with_storage(dtype, rows, num_channels, Storage::Borrowed(buffer))
    }

    pub fn ndim(&self) -> usize {
        2
    }

    pub fn shape(&self) -> [i64; 2] {
        self.shape
    }

    pub fn strides(&self) -> [i64; 2] {
        self.strides
    }

    pub fn byte_offset(&self) -> u64 {
        0
    }

    pub fn num_samples(&self) -> usize {
        self.shape[0] as usize
    }

    pub fn num_channels(&self) -> usize {
        self.shape[1] as usize
    }

    pub fn nbytes(&self) -> usize {
        self.num_samples() * self.num_channels() * self.dtype.itemsize()
    }

    pub fn storage(&self) -> &Storage<'a> {
        &self.storage
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_))
    }

    pub fn data(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Owned(buffer) => buffer.as_slice(),
            Storage::Borrowed(buffer) => Some(&buffer[..]),
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Storage::Empty => None,
            Storage::Owned(buffer) => buffer.as_mut_slice(),
            Storage::Borrowed(buffer) => Some(&mut buffer[..]),
        }
    }

    /// Free owned memory and clear shape and strides. Borrowed and empty
    /// tensors have nothing to release; returns whether memory was freed.
    pub fn release(&mut self) -> bool {
        match &mut self.storage {
            Storage::Owned(buffer) => {
                let freed = buffer.release();
                self.shape = [0, 0];
                self.strides = [0, 0];
                freed
            }
            Storage::Empty | Storage::Borrowed(_) => false,
        }
    }

    /// Non-owning DLPack view. The pointers stay valid while `self` is
    /// neither moved nor released.
    pub fn as_dl_tensor(&mut self) -> DLTensor {
        let data = self.data_mut().map_or(std::ptr::null_mut(), |data| data.as_mut_ptr());
        dlpack::view(data, self.dtype, &mut self.shape, &mut self.strides)
    }

    /// Move an owned tensor into a DLPack managed tensor. Anything else
    /// is handed back unchanged.
    pub fn into_dl_managed(self) -> std::result::Result<ManagedTensor, Self> {
        let Tensor { device, dtype, shape, strides, storage } = self;
        match storage {
            Storage::Owned(mut buffer) => match buffer.take() {
                Some(data) => Ok(ManagedTensor::new(data, dtype, shape, strides)),
                None => {
                    let storage = Storage::Owned(buffer);
                    Err(Tensor { device, dtype, shape, strides, storage })
                }
            },
            storage => Err(Tensor { device, dtype, shape, strides, storage }),
        }
    }
}
