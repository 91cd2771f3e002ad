//! Input sources: a named resource or an in-memory buffer behind a cursor

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::probe::Hint;
use crate::error::{DecodeAudioError, Result};

/// Seek origin; `Size` reports the total length without moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
    Size,
}

/// Read/seek cursor over a fixed memory region
#[derive(Debug, Clone)]
pub struct MemoryCursor {
    data: Arc<[u8]>,
    position: u64,
}

impl MemoryCursor {
    /// An `Arc<[u8]>` is shared as is. A `Vec<u8>` or `&[u8]` is copied
    /// once into a new allocation; the decoder needs `'static` input, so a
    /// caller that keeps its bytes should pass them behind an `Arc`.
    pub fn new<D: Into<Arc<[u8]>>>(data: D) -> Self {
        Self { data: data.into(), position: 0 }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.len() - self.position
    }

    pub fn seek_whence(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        let base = match whence {
            Whence::Size => return Ok(self.len()),
            Whence::Start => 0i128,
            Whence::Current => self.position as i128,
            Whence::End => self.len() as i128,
        };

        let target = base + offset as i128;
        if target < 0 || target > self.len() as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {} outside of buffer of {} bytes", target, self.len()),
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

impl Read for MemoryCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining() as usize);
        if n == 0 {
            return Ok(0);
        }
        let start = self.position as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset too large")
                })?;
                self.seek_whence(offset, Whence::Start)
            }
            SeekFrom::Current(offset) => self.seek_whence(offset, Whence::Current),
            SeekFrom::End(offset) => self.seek_whence(offset, Whence::End),
        }
    }
}

impl MediaSource for MemoryCursor {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len())
    }
}

/// Container hints forwarded to the prober
#[derive(Debug, Clone, Default)]
pub struct InputHint {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
}

impl InputHint {
    pub fn to_probe_hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = &self.extension {
            hint.with_extension(ext);
        }
        if let Some(mime) = &self.mime_type {
            hint.mime_type(mime);
        }
        hint
    }
}

#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Memory(MemoryCursor),
}

impl Source {
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        Source::Path(path.as_ref().to_path_buf())
    }

    /// In-memory source; see [`MemoryCursor::new`] for when the bytes are
    /// copied
    pub fn memory<D: Into<Arc<[u8]>>>(data: D) -> Self {
        Source::Memory(MemoryCursor::new(data))
    }

    /// Extension of a path source, used when the caller gave no hint
    pub fn extension(&self) -> Option<&str> {
        match self {
            Source::Path(path) => path.extension().and_then(|ext| ext.to_str()),
            Source::Memory(_) => None,
        }
    }

    pub fn open(self) -> Result<MediaSourceStream> {
        let media: Box<dyn MediaSource> = match self {
            Source::Path(path) => {
                let file = File::open(&path).map_err(|e| {
                    DecodeAudioError::io(format!("Could not open file {}: {}", path.display(), e))
                })?;
                Box::new(file)
            }
            Source::Memory(cursor) => {
                log::debug!("Reading from in-memory buffer of {} bytes", cursor.len());
                Box::new(cursor)
            }
        };

        Ok(MediaSourceStream::new(media, MediaSourceStreamOptions::default()))
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Memory(cursor) => write!(f, "<memory: {} bytes>", cursor.len()),
        }
    }
}
