//! # AWG Server Library
//!
//! This crate provides the playback core of the AWG control server: a
//! real-time service that streams packed 32-bit command words to an
//! FPGA-based arbitrary-waveform generator.
//!
//! ## Overview
//!
//! Remote clients stage frames of command words over TCP; a periodic player
//! thread emits one frame per tick into the hardware. Two preload lists are
//! alternated ping-pong style so the next sequence can be staged while the
//! current one plays, and the switch between them happens within a single
//! tick.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[`AwgDevice`] Trait**: the interface a hardware backend implements to
//!   drive command words onto the peripheral's data bus
//! - **[`AwgServer`]**: the aggregate owning the three TCP endpoints (direct,
//!   queued, notification), the player thread, and the device
//!
//! ## How It Works
//!
//! 1. A backend (e.g. `/dev/mem` mmap, UIO device) implements [`AwgDevice`]
//! 2. The backend is wrapped in an [`AwgServer`] which primes the PL with
//!    zero-gain frames and then starts listening
//! 3. Queued clients preload frames with `B`/`P`/`E` records; the player
//!    consumes one frame per tick and reports list transitions on the
//!    notification endpoint
//! 4. Direct clients bypass the queue entirely for ad-hoc low-latency control
//! 5. On shutdown both lists are flushed with zero-gain frames so the
//!    hardware ends up silent
//!
//! For the wire formats, see the [`awg_protocol`](https://docs.rs/awg-protocol/) crate.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use awg_server::{AwgDevice, Builder};
//!
//! struct MyDevice {
//!     // backend-specific fields
//! }
//!
//! impl AwgDevice for MyDevice {
//!     fn send_words(&mut self, words: &[u32]) {
//!         // drive each word onto the bus with one WEN pulse
//!     }
//! }
//!
//! let handle = Builder::new().start(MyDevice::new()?)?;
//! // ... run until a stop is requested ...
//! handle.shutdown();
//! ```
//!
//! ## Error Handling
//!
//! The queued and direct wire protocols carry no error responses; a
//! misbehaving connection is simply dropped and its unfinished preloads are
//! rolled back. The notification endpoint is the sole feedback channel.
//! Startup failures are reported through [`StartError`].
//!
//! ## Configuration
//!
//! Behaviour is customised via [`Config`] or [`Builder`]:
//!
//! - **ports** for the three endpoints (0 picks an ephemeral port)
//! - **period**: the player tick period (default 1 ms)
//! - **flush_frames**: zero-gain frames used to prime/flush the PL
//!   (default 100)
//! - **read timeouts** for the queued (5 s) and direct (100 ms) endpoints
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Enable logging to see:
//! - Client connections, replacements, and disconnections
//! - List transitions and player switches
//! - PL priming and flush progress
//!
//! Configure logging with an implementation like `env_logger`:
//!
//! ```ignore
//! env_logger::init();
//! ```
//!
//! ## Thread Model
//!
//! Four long-lived threads: one acceptor per endpoint plus the player, which
//! is the only emitter to the hardware during queued playback. Direct
//! connections get short-lived detached workers. The player and the direct
//! workers serialize on a dedicated HW mutex wrapped around the device.

use std::time::Duration;

use awg_protocol::word;

pub mod list;
pub mod server;
pub use server::{AwgServer, Builder, Config, ServerHandle, StartError};

mod direct;
mod notify;
mod player;
mod queue;

/// Poll interval of the non-blocking accept loops.
pub(crate) const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Trait that hardware backends implement to drive the AWG peripheral.
///
/// This is the seam between the playback core and the actual register
/// access. Implementors translate each word into a data-bus write followed
/// by one write-enable pulse.
///
/// Callers guarantee single-writer access: the server wraps the device in a
/// mutex shared by the player and the direct endpoint, so `send_words` never
/// runs concurrently with itself.
pub trait AwgDevice {
    /// Streams `words` to the peripheral in order.
    ///
    /// For each word the backend writes the data register and pulses WEN
    /// exactly once, preserving order against compiler and CPU reordering.
    /// The call returns only after the last pulse has been driven; there is
    /// no buffering.
    fn send_words(&mut self, words: &[u32]);

    /// Drives every (channel, tone) gain to zero and commits, leaving the
    /// output silent.
    fn zero_output(&mut self) {
        self.send_words(&word::zero_gain_frame());
    }
}
