//! DLPack interchange structs
//!
//! Layouts follow `dlpack.h`, so consumers in other languages can read
//! the tensor in place.

use std::ffi::c_void;
use std::ptr;
use super::{DataType, DataTypeCode};

pub const KDL_CPU: i32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DLDevice {
    pub device_type: i32,
    pub device_id: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DLDataType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

impl From<DataType> for DLDataType {
    fn from(dtype: DataType) -> Self {
        Self { code: dtype.code as u8, bits: dtype.bits, lanes: dtype.lanes }
    }
}

impl DLDataType {
    pub fn to_data_type(self) -> Option<DataType> {
        let code = match self.code {
            0 => DataTypeCode::Int,
            1 => DataTypeCode::UInt,
            2 => DataTypeCode::Float,
            _ => return None,
        };
        Some(DataType { code, bits: self.bits, lanes: self.lanes })
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
    pub data: *mut c_void,
    pub device: DLDevice,
    pub ndim: i32,
    pub dtype: DLDataType,
    pub shape: *mut i64,
    pub strides: *mut i64,
    pub byte_offset: u64,
}

#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    pub dl_tensor: DLTensor,
    pub manager_ctx: *mut c_void,
    pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

pub(super) fn view(
    data: *mut u8,
    dtype: DataType,
    shape: &mut [i64; 2],
    strides: &mut [i64; 2],
) -> DLTensor {
    DLTensor {
        data: data.cast(),
        device: DLDevice { device_type: KDL_CPU, device_id: 0 },
        ndim: 2,
        dtype: dtype.into(),
        shape: shape.as_mut_ptr(),
        strides: strides.as_mut_ptr(),
        byte_offset: 0,
    }
}

struct ManagerContext {
    _data: Box<[u8]>,
    _shape: Box<[i64; 2]>,
    _strides: Box<[i64; 2]>,
}

/// Deleter installed on exported tensors. Frees data, shape and strides
/// and nulls the pointers, so a second call does nothing.
unsafe extern "C" fn release_context(managed: *mut DLManagedTensor) {
    if managed.is_null() {
        return;
    }
    // SAFETY: `managed` points at the struct owned by a live ManagedTensor.
    let managed = unsafe { &mut *managed };
    if managed.manager_ctx.is_null() {
        return;
    }
    // SAFETY: manager_ctx was produced by Box::into_raw in ManagedTensor::new
    // and is nulled right after being reclaimed.
    drop(unsafe { Box::from_raw(managed.manager_ctx.cast::<ManagerContext>()) });
    managed.manager_ctx = ptr::null_mut();
    managed.dl_tensor.data = ptr::null_mut();
    managed.dl_tensor.shape = ptr::null_mut();
    managed.dl_tensor.strides = ptr::null_mut();
    log::debug!("DLPack tensor released");
}

/// Owned tensor exported in DLPack form.
///
/// The struct itself stays owned by this handle; consumers receive
/// [`ManagedTensor::as_mut_ptr`] and release the contents through its
/// `deleter`. Dropping the handle invokes the deleter if nobody did.
pub struct ManagedTensor {
    inner: Box<DLManagedTensor>,
}

impl ManagedTensor {
    pub(super) fn new(
        data: Box<[u8]>,
        dtype: DataType,
        shape: [i64; 2],
        strides: [i64; 2],
    ) -> Self {
        let mut data = data;
        let mut shape = Box::new(shape);
        let mut strides = Box::new(strides);
        let dl_tensor = view(data.as_mut_ptr(), dtype, &mut shape, &mut strides);
        let context = Box::new(ManagerContext { _data: data, _shape: shape, _strides: strides });

        Self {
            inner: Box::new(DLManagedTensor {
                dl_tensor,
                manager_ctx: Box::into_raw(context).cast(),
                deleter: Some(release_context as unsafe extern "C" fn(*mut DLManagedTensor)),
            }),
        }
    }

    pub fn dl_tensor(&self) -> &DLTensor {
        &self.inner.dl_tensor
    }

    pub fn as_mut_ptr(&mut self) -> *mut DLManagedTensor {
        &mut *self.inner
    }

    pub fn is_released(&self) -> bool {
        self.inner.manager_ctx.is_null()
    }

    /// Bytes of the exported buffer, `None` once released
    pub fn data(&self) -> Option<&[u8]> {
        let tensor = &self.inner.dl_tensor;
        if tensor.data.is_null() {
            return None;
        }
        // SAFETY: data/shape point into the live ManagerContext; the byte
        // length is shape[0] * shape[1] * itemsize by construction.
        unsafe {
            let shape = std::slice::from_raw_parts(tensor.shape, 2);
            let itemsize = tensor.dtype.lanes as usize * tensor.dtype.bits as usize / 8;
            let len = shape[0] as usize * shape[1] as usize * itemsize;
            Some(std::slice::from_raw_parts(tensor.data.cast::<u8>(), len))
        }
    }

    pub fn release(&mut self) {
        if let Some(deleter) = self.inner.deleter {
            // SAFETY: the deleter only touches the struct behind the pointer
            // and tolerates repeated calls.
            unsafe { deleter(self.as_mut_ptr()) };
        }
    }
}

impl Drop for ManagedTensor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ManagedTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedTensor")
            .field("dtype", &self.inner.dl_tensor.dtype)
            .field("released", &self.is_released())
            .finish()
    }
}
