//! # /dev/mem Backend
//!
//! Maps the two AXI GPIO register windows straight from physical memory.
//! Requires root (or an equivalently privileged memory device node).
//!
//! ## Example Usage
//!
//! ```ignore
//! use awg_server::Builder;
//! use backends::devmem::DevMemBackend;
//! use backends::gpio::WenConfig;
//!
//! let device = DevMemBackend::new("/dev/mem", WenConfig::default())?;
//! let handle = Builder::new().start(device)?;
//! ```
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::libc;

use awg_server::AwgDevice;

use super::gpio::{RegisterWindows, WenConfig};

/// Physical base address of the 32-bit DATA bus AXI GPIO.
const DATA_GPIO_BASE: libc::off_t = 0x4120_0000;
/// Physical base address of the 1-bit WEN AXI GPIO.
const WEN_GPIO_BASE: libc::off_t = 0x4121_0000;

/// Memory device used when no path is given.
pub const DEFAULT_MEM_PATH: &str = "/dev/mem";

/// Backend driving the AWG through `/dev/mem` mappings of the two AXI GPIO
/// blocks at their fixed physical addresses.
pub struct DevMemBackend {
    regs: RegisterWindows,
}

impl DevMemBackend {
    pub fn new(path: impl AsRef<Path>, wen: WenConfig) -> io::Result<DevMemBackend> {
        let device_path = path.as_ref();
        log::debug!("Opening memory device: {}", device_path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device_path)?;
        let regs = RegisterWindows::map(&file, DATA_GPIO_BASE, WEN_GPIO_BASE, wen)?;
        log::info!(
            "AXI GPIO windows mapped (data=0x{:x}, wen=0x{:x})",
            DATA_GPIO_BASE,
            WEN_GPIO_BASE
        );
        Ok(DevMemBackend { regs })
    }
}

impl AwgDevice for DevMemBackend {
    fn send_words(&mut self, words: &[u32]) {
        self.regs.send_words(words);
    }
}
