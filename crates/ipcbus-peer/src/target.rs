//! The slave's view of its own address space.

use std::collections::BTreeMap;
use std::ops::Range;

use ipcbus_command::{ErrorCode, Width};

/// Register access on the slave side.
///
/// Failures are reported as the protocol code the responder puts in its
/// NACK.
pub trait RegisterTarget {
    fn read(&mut self, addr: u32, width: Width) -> Result<u32, ErrorCode>;

    fn write(&mut self, addr: u32, width: Width, value: u32) -> Result<(), ErrorCode>;

    /// Replace the bits of `mask` with those of `val`.
    ///
    /// The default is a plain read-modify-write; targets backed by real
    /// hardware override it when the update must be atomic.
    fn set_clear(
        &mut self,
        addr: u32,
        width: Width,
        mask: u32,
        val: u32,
    ) -> Result<(), ErrorCode> {
        let old = self.read(addr, width)?;
        self.write(addr, width, (old & !mask) | (val & mask))
    }
}

impl<T: RegisterTarget + ?Sized> RegisterTarget for &mut T {
    fn read(&mut self, addr: u32, width: Width) -> Result<u32, ErrorCode> {
        (**self).read(addr, width)
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) -> Result<(), ErrorCode> {
        (**self).write(addr, width, value)
    }

    fn set_clear(
        &mut self,
        addr: u32,
        width: Width,
        mask: u32,
        val: u32,
    ) -> Result<(), ErrorCode> {
        (**self).set_clear(addr, width, mask, val)
    }
}

/// Sparse little-endian memory for simulated slaves.
///
/// Unwritten bytes read as zero. With no regions configured every address
/// is valid; otherwise accesses must fall entirely inside one region or
/// they fail with `BAD_ADDR`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    bytes: BTreeMap<u32, u8>,
    regions: Vec<Range<u32>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict valid accesses to `region` (and any other added regions).
    pub fn with_region(mut self, region: Range<u32>) -> Self {
        self.regions.push(region);
        self
    }

    /// Preload raw bytes starting at `addr`, ignoring regions.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(offset as u32), *byte);
        }
    }

    /// Copy `len` bytes starting at `addr`, ignoring regions.
    pub fn dump(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|offset| self.byte(addr.wrapping_add(offset as u32)))
            .collect()
    }

    /// Number of bytes ever written.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn byte(&self, addr: u32) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }

    fn check(&self, addr: u32, width: Width) -> Result<(), ErrorCode> {
        let end = u64::from(addr) + width.bytes() as u64;
        if !width.is_aligned(addr) {
            return Err(ErrorCode::NotAligned);
        }
        if end > u64::from(u32::MAX) + 1 {
            return Err(ErrorCode::BadAddr);
        }
        if self.regions.is_empty()
            || self
                .regions
                .iter()
                .any(|r| addr >= r.start && end <= u64::from(r.end))
        {
            Ok(())
        } else {
            Err(ErrorCode::BadAddr)
        }
    }
}

impl RegisterTarget for MemoryTarget {
    fn read(&mut self, addr: u32, width: Width) -> Result<u32, ErrorCode> {
        self.check(addr, width)?;
        let value = (0..width.bytes()).fold(0u32, |acc, i| {
            acc | u32::from(self.byte(addr + i as u32)) << (8 * i)
        });
        Ok(value)
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) -> Result<(), ErrorCode> {
        self.check(addr, width)?;
        for (i, byte) in value.to_le_bytes().iter().take(width.bytes()).enumerate() {
            self.bytes.insert(addr + i as u32, *byte);
        }
        Ok(())
    }
}
