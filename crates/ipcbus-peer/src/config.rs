use std::time::Duration;

use ipcbus_frame::FrameConfig;

/// Configuration for a request/response session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for a matching response.
    pub timeout: Duration,
    /// Pause between link polls while nothing is arriving.
    pub poll_interval: Duration,
    /// Log every raw frame at `debug` instead of `trace`.
    pub trace: bool,
    /// Frame codec settings, including the CRC algorithm.
    pub frame: FrameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10),
            poll_interval: Duration::from_micros(50),
            trace: false,
            frame: FrameConfig::default(),
        }
    }
}

/// Where the slave's flash lives in its address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// Bus address of flash offset 0.
    pub base: u32,
    /// Size of the addressable flash window in bytes.
    pub window: u32,
    /// Erase sector size; update lengths must be a multiple of it.
    pub sector_size: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            base: 0,
            window: 1 << 24,
            sector_size: 0x10000,
        }
    }
}
