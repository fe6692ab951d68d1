//! # AXI GPIO register windows
//!
//! Both backends drive the same pair of AXI GPIO blocks: a 32-bit DATA bus
//! and a 1-bit write-enable line, each a 4 KiB register window. This module
//! owns the mapped windows and the word-strobe sequence; the backends differ
//! only in where the mappings come from.
//!
//! Register layout (single-channel AXI GPIO): offset `0x00` is the value
//! register. Offset `0x04` is the direction register, preconfigured as
//! output by the bitstream and never written here.
use std::fs::File;
use std::io;
use std::num::NonZero;
use std::ptr::{read_volatile, write_volatile, NonNull};
use std::sync::atomic::{fence, Ordering};
use std::thread;
use std::time::Duration;

use nix::libc::off_t;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use awg_server::AwgDevice;

/// Bit of the WEN register carrying the strobe.
const WEN_BIT: u32 = 1 << 0;

/// Size of each mapped register window.
pub const MAP_LEN: usize = 0x1000;

/// Polarity and shape of the write-enable strobe.
#[derive(Debug, Clone, Copy)]
pub struct WenConfig {
    /// WEN rests high and pulses low when true.
    pub active_low: bool,
    /// Dwell time between the two WEN edges; zero means edge-only.
    pub pulse: Duration,
}

impl Default for WenConfig {
    fn default() -> Self {
        WenConfig {
            active_low: false,
            pulse: Duration::ZERO,
        }
    }
}

/// Volatile store followed by a full fence so the
/// WRITE_DATA -> WEN_RISE -> WEN_FALL order survives compiler and CPU
/// reordering.
unsafe fn reg_write(reg: *mut u32, value: u32) {
    write_volatile(reg, value);
    fence(Ordering::SeqCst);
}

unsafe fn reg_read(reg: *const u32) -> u32 {
    let value = read_volatile(reg);
    fence(Ordering::SeqCst);
    value
}

fn map_window(file: &File, offset: off_t) -> io::Result<NonNull<u32>> {
    // SAFETY: maps a dedicated 4 KiB register window; the pointer is used
    // only through volatile access while the mapping lives.
    let ptr = unsafe {
        mmap(
            None,
            NonZero::new(MAP_LEN).unwrap(),
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            offset,
        )?
    };
    Ok(ptr.cast())
}

/// The mapped DATA and WEN windows plus the strobe configuration.
pub struct RegisterWindows {
    data: NonNull<u32>,
    wen: NonNull<u32>,
    wen_cfg: WenConfig,
}

// SAFETY: the pointers reference exclusively-owned device mappings that stay
// valid until drop, and all register access goes through &mut self.
unsafe impl Send for RegisterWindows {}

impl RegisterWindows {
    /// Maps both windows from `file` at the given offsets and drives the bus
    /// to its quiescent state: DATA 0, WEN at its inactive level.
    pub fn map(
        file: &File,
        data_offset: off_t,
        wen_offset: off_t,
        wen_cfg: WenConfig,
    ) -> io::Result<RegisterWindows> {
        let data = map_window(file, data_offset)?;
        let wen = match map_window(file, wen_offset) {
            Ok(wen) => wen,
            Err(e) => {
                // SAFETY: `data` was mapped with MAP_LEN just above and has
                // not been handed out.
                unsafe {
                    let _ = munmap(data.cast(), MAP_LEN);
                }
                return Err(e);
            }
        };
        let mut regs = RegisterWindows { data, wen, wen_cfg };
        regs.write_data(0);
        regs.set_wen_inactive();
        Ok(regs)
    }

    fn write_data(&mut self, word: u32) {
        // SAFETY: offset 0 lies within the mapped DATA window.
        unsafe { reg_write(self.data.as_ptr(), word) }
    }

    fn wen_level(&self) -> u32 {
        // SAFETY: offset 0 lies within the mapped WEN window.
        unsafe { reg_read(self.wen.as_ptr()) }
    }

    fn set_wen_inactive(&mut self) {
        let level = self.wen_level();
        let idle = if self.wen_cfg.active_low {
            level | WEN_BIT
        } else {
            level & !WEN_BIT
        };
        // SAFETY: as above.
        unsafe { reg_write(self.wen.as_ptr(), idle) }
    }

    /// One rising and one falling edge; the peripheral samples the data bus
    /// on the active edge. Other bits of the WEN register are preserved.
    fn wen_pulse(&mut self) {
        let level = self.wen_level();
        let (active, idle) = if self.wen_cfg.active_low {
            (level & !WEN_BIT, level | WEN_BIT)
        } else {
            (level | WEN_BIT, level & !WEN_BIT)
        };
        // SAFETY: as above.
        unsafe {
            reg_write(self.wen.as_ptr(), active);
            if !self.wen_cfg.pulse.is_zero() {
                thread::sleep(self.wen_cfg.pulse);
            }
            reg_write(self.wen.as_ptr(), idle);
        }
    }
}

impl AwgDevice for RegisterWindows {
    fn send_words(&mut self, words: &[u32]) {
        for &word in words {
            self.write_data(word);
            self.wen_pulse();
        }
    }
}

impl Drop for RegisterWindows {
    fn drop(&mut self) {
        // SAFETY: both windows were mapped with MAP_LEN and are not touched
        // after this point.
        unsafe {
            let _ = munmap(self.data.cast(), MAP_LEN);
            let _ = munmap(self.wen.cast(), MAP_LEN);
        }
    }
}
