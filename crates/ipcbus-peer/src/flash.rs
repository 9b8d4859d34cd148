//! Chunked flash programming over ordinary WRITE exchanges.

use ipcbus_command::{CommandError, Width, MAX_RW_COUNT};
use ipcbus_link::Link;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{PeerError, Result};
use crate::ops::RegisterClient;

/// Bytes carried by one full flash chunk: 256 32-bit words.
pub const FLASH_CHUNK_BYTES: usize = MAX_RW_COUNT * 4;

/// Progress of a running flash update, reported after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashProgress {
    /// Zero-based index of the chunk just written.
    pub index: usize,
    pub total: usize,
    /// Bus address of the chunk just written.
    pub addr: u32,
    pub bytes_written: usize,
}

/// Summary of a completed flash update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashReport {
    pub start_addr: u32,
    pub length: u32,
    pub chunks: usize,
}

impl<L: Link, C: Clock> RegisterClient<L, C> {
    /// Program `length` bytes of `source` into flash at `offset`.
    ///
    /// See [`flash_update_with_progress`](Self::flash_update_with_progress).
    pub fn flash_update(&mut self, offset: u32, length: u32, source: &[u8]) -> Result<FlashReport> {
        self.flash_update_with_progress(offset, length, source, |_| {})
    }

    /// Program `length` bytes of `source` into flash at `offset`, calling
    /// `progress` after every chunk.
    ///
    /// The range must fit the flash window and `length` must be a whole
    /// number of sectors; both are checked before the first WRITE. Chunks go
    /// out in ascending address order. The first failed chunk stops the
    /// update and is reported as [`PeerError::FlashChunk`]; chunks already
    /// written stay written.
    pub fn flash_update_with_progress<F>(
        &mut self,
        offset: u32,
        length: u32,
        source: &[u8],
        mut progress: F,
    ) -> Result<FlashReport>
    where
        F: FnMut(FlashProgress),
    {
        let start_addr = self.check_flash_range(offset, length, source)?;
        let image = &source[..length as usize];
        let total = image.len().div_ceil(FLASH_CHUNK_BYTES);

        debug!(
            start = format_args!("{start_addr:#010x}"),
            length, total, "starting flash update"
        );

        let mut bytes_written = 0;
        for (index, chunk) in image.chunks(FLASH_CHUNK_BYTES).enumerate() {
            // Chunks are at most 1 KiB and the range was checked above.
            let addr = start_addr + (index * FLASH_CHUNK_BYTES) as u32;
            let words: Vec<u32> = chunk
                .chunks_exact(4)
                .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                .collect();

            self.write(addr, Width::U32, &words)
                .map_err(|source| PeerError::FlashChunk {
                    index,
                    addr,
                    source: Box::new(source),
                })?;

            bytes_written += chunk.len();
            debug!(index, addr = format_args!("{addr:#010x}"), "flash chunk written");
            progress(FlashProgress {
                index,
                total,
                addr,
                bytes_written,
            });
        }

        info!(
            start = format_args!("{start_addr:#010x}"),
            length,
            chunks = total,
            "flash update complete"
        );
        Ok(FlashReport {
            start_addr,
            length,
            chunks: total,
        })
    }

    /// Validate a flash request and return its starting bus address.
    fn check_flash_range(&self, offset: u32, length: u32, source: &[u8]) -> Result<u32> {
        let flash = &self.flash;
        if u64::from(offset) + u64::from(length) > u64::from(flash.window) {
            return Err(PeerError::FlashRange {
                offset,
                length,
                window: flash.window,
            });
        }
        if length == 0
            || flash.sector_size == 0
            || length % flash.sector_size != 0
            || length % 4 != 0
        {
            return Err(PeerError::FlashAlignment {
                length,
                sector_size: flash.sector_size,
            });
        }
        if source.len() < length as usize {
            return Err(PeerError::FlashSourceTooShort {
                needed: length as usize,
                available: source.len(),
            });
        }

        let start = flash
            .base
            .checked_add(offset)
            .filter(|start| start.checked_add(length - 1).is_some())
            .ok_or(PeerError::FlashRange {
                offset,
                length,
                window: flash.window,
            })?;
        if !Width::U32.is_aligned(start) {
            return Err(CommandError::NotAligned {
                addr: start,
                width: Width::U32.bytes(),
            }
            .into());
        }
        Ok(start)
    }
}
