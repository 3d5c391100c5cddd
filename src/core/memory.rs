//! Memory - Debuggee address space
//!
//! Exposes debuggee memory as addressable regions on top of the engine's
//! data-space interface. Reads pass short results through untouched; writes
//! must land in full or the session's view of memory is no longer trusted.

use std::ops::Range;

use thiserror::Error;

use crate::debug::{DataSpaces, EngineError};

/// Memory operation errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Buffer size and range don't agree: {actual} != {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Short write to memory at {address:#x}: {written} < {requested}. Inconsistent state")]
    InconsistentMemoryState {
        address: u64,
        written: usize,
        requested: usize,
    },

    #[error("Invalid memory range: {start:#x}..{end:#x}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Short read at {address:#x}: {read} < {requested}")]
    ShortRead {
        address: u64,
        read: usize,
        requested: usize,
    },

    #[error("Invalid string at {address:#x}: {reason}")]
    InvalidString { address: u64, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl MemoryError {
    /// Whether the session's picture of debuggee memory can still be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemoryError::InconsistentMemoryState { .. })
    }
}

/// A single address or a half-open address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Address(u64),
    Range(Range<u64>),
}

impl From<u64> for Region {
    fn from(address: u64) -> Self {
        Region::Address(address)
    }
}

impl From<Range<u64>> for Region {
    fn from(range: Range<u64>) -> Self {
        Region::Range(range)
    }
}

impl Region {
    fn start(&self) -> u64 {
        match self {
            Region::Address(address) => *address,
            Region::Range(range) => range.start,
        }
    }

    /// Length of a range region
    fn range_len(range: &Range<u64>) -> Result<usize, MemoryError> {
        if range.end < range.start {
            return Err(MemoryError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        Ok((range.end - range.start) as usize)
    }
}

/// Indexable view over debuggee memory
///
/// Borrows the engine's data spaces for as long as the view lives.
pub struct AddressSpace<'a, D: DataSpaces + ?Sized> {
    dataspaces: &'a mut D,
}

impl<'a, D: DataSpaces + ?Sized> AddressSpace<'a, D> {
    pub fn new(dataspaces: &'a mut D) -> Self {
        Self { dataspaces }
    }

    /// Read a region: one byte for an address, `end - start` bytes for a range
    pub fn read(&mut self, region: impl Into<Region>) -> Result<Vec<u8>, MemoryError> {
        match region.into() {
            Region::Address(address) => self.read_bytes(address, 1),
            Region::Range(range) => {
                let count = Region::range_len(&range)?;
                self.read_bytes(range.start, count)
            }
        }
    }

    pub fn read_at(&mut self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.read_bytes(address, len)
    }

    pub fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, MemoryError> {
        self.read(start..end)
    }

    /// Bulk read; the result may be shorter than `count`
    pub fn read_bytes(&mut self, address: u64, count: usize) -> Result<Vec<u8>, MemoryError> {
        let data = self.dataspaces.read(address, count)?;
        log::trace!(
            "read {:#x} [{}/{}]: {}",
            address,
            data.len(),
            count,
            hex::encode(&data)
        );
        Ok(data)
    }

    /// Write a region
    ///
    /// A range must match `data` in length exactly. A single address takes
    /// the whole buffer.
    pub fn write(&mut self, region: impl Into<Region>, data: &[u8]) -> Result<(), MemoryError> {
        let region = region.into();
        let requested = match &region {
            Region::Address(_) => data.len(),
            Region::Range(range) => {
                let count = Region::range_len(range)?;
                if data.len() != count {
                    return Err(MemoryError::SizeMismatch {
                        expected: count,
                        actual: data.len(),
                    });
                }
                count
            }
        };

        let address = region.start();
        log::trace!("write {:#x}: {}", address, hex::encode(data));
        let written = self.dataspaces.write(address, data)?;

        if written != requested {
            log::error!(
                "Short write at {:#x}: {} of {} bytes",
                address,
                written,
                requested
            );
            return Err(MemoryError::InconsistentMemoryState {
                address,
                written,
                requested,
            });
        }
        Ok(())
    }

    /// Find `pattern` within `count` bytes from `address`
    pub fn find(
        &mut self,
        pattern: &[u8],
        address: u64,
        count: usize,
    ) -> Result<Option<u64>, MemoryError> {
        self.find_aligned(pattern, address, count, 1)
    }

    /// Find `pattern` at offsets from `address` that are multiples of `alignment`
    pub fn find_aligned(
        &mut self,
        pattern: &[u8],
        address: u64,
        count: usize,
        alignment: usize,
    ) -> Result<Option<u64>, MemoryError> {
        let found = self.dataspaces.search(pattern, address, count, alignment)?;
        log::trace!(
            "search {:#x}+{:#x} for {} (align {}): {:?}",
            address,
            count,
            hex::encode(pattern),
            alignment,
            found
        );
        Ok(found)
    }

    /// Read exactly `N` bytes
    fn read_exact<const N: usize>(&mut self, address: u64) -> Result<[u8; N], MemoryError> {
        let data = self.read_bytes(address, N)?;
        data.as_slice()
            .try_into()
            .map_err(|_| MemoryError::ShortRead {
                address,
                read: data.len(),
                requested: N,
            })
    }

    pub fn read_u8(&mut self, address: u64) -> Result<u8, MemoryError> {
        Ok(self.read_exact::<1>(address)?[0])
    }

    pub fn read_u16(&mut self, address: u64) -> Result<u16, MemoryError> {
        self.read_exact(address).map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self, address: u64) -> Result<u32, MemoryError> {
        self.read_exact(address).map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self, address: u64) -> Result<u64, MemoryError> {
        self.read_exact(address).map(u64::from_le_bytes)
    }

    /// Read a null-terminated string of at most `max_len` bytes
    pub fn read_cstring(&mut self, address: u64, max_len: usize) -> Result<String, MemoryError> {
        let buffer = self.read_bytes(address, max_len)?;
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());

        String::from_utf8(buffer[..end].to_vec()).map_err(|e| MemoryError::InvalidString {
            address,
            reason: e.to_string(),
        })
    }
}

/// Offset of the first occurrence of `pattern` in `haystack`
///
/// `base_offset` is the distance of `haystack[0]` from the start of the
/// search; only matches whose distance is a multiple of `alignment` count.
pub fn find_pattern(
    haystack: &[u8],
    pattern: &[u8],
    base_offset: usize,
    alignment: usize,
) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > haystack.len() {
        return None;
    }
    let alignment = alignment.max(1);
    let skip = (alignment - base_offset % alignment) % alignment;

    (skip..=haystack.len() - pattern.len())
        .step_by(alignment)
        .find(|&i| haystack[i..].starts_with(pattern))
}
