//! # UIO Backend
//!
//! For register windows exposed through the Linux UIO subsystem. The device
//! node must expose two maps: map 0 is the DATA GPIO window, map 1 the WEN
//! GPIO window (UIO places map `i` at mmap offset `i * page size`).
//!
//! ## Example Usage
//!
//! ```ignore
//! use awg_server::Builder;
//! use backends::uio::UioBackend;
//! use backends::gpio::WenConfig;
//!
//! let device = UioBackend::new("/dev/uio0", WenConfig::default())?;
//! let handle = Builder::new().start(device)?;
//! ```
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use nix::libc;

use awg_server::AwgDevice;

use super::gpio::{RegisterWindows, WenConfig, MAP_LEN};

/// UIO device name the auto-detection looks for (set by the device tree).
const UIO_NAME: &str = "awg";

/// Backend driving the AWG through a UIO device node.
pub struct UioBackend {
    regs: RegisterWindows,
}

impl UioBackend {
    pub fn new(path: impl AsRef<Path>, wen: WenConfig) -> io::Result<UioBackend> {
        let device_path = path.as_ref();
        log::debug!("Opening UIO device: {}", device_path.display());
        let file = OpenOptions::new().read(true).write(true).open(device_path)?;
        let regs = RegisterWindows::map(&file, 0, MAP_LEN as libc::off_t, wen)?;
        log::info!("UIO register windows mapped from {}", device_path.display());
        Ok(UioBackend { regs })
    }
}

impl AwgDevice for UioBackend {
    fn send_words(&mut self, words: &[u32]) {
        self.regs.send_words(words);
    }
}

/// Attempts to automatically find the AWG register block via the UIO driver
pub fn uio_device_path() -> Option<PathBuf> {
    let uio_class_path = Path::new("/sys/class/uio");
    for entry in uio_class_path.read_dir().ok()? {
        let mut path = entry.ok()?.path();
        log::debug!("Looking at UIO path {}", path.display());
        path.push("name");
        let name = match fs::read_to_string(&path) {
            Ok(name) => name,
            Err(_) => continue,
        };
        let uio_name = name.trim();
        log::debug!("UIO has name {}", uio_name);
        if uio_name == UIO_NAME {
            // This will be something like 'uio2'
            let uio_indexed_name = path.parent()?.file_name()?;
            let mut dev_path = PathBuf::from("/dev");
            // This will be something like '/dev/uio2'
            dev_path.push(uio_indexed_name);
            return Some(dev_path);
        }
    }
    None
}
