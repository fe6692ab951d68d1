//! # AWG Client
//!
//! Blocking TCP clients for the three endpoints of the AWG control server:
//! the queued playback channel, the direct passthrough channel, and the
//! status notification stream.
//!
//! ## Overview
//!
//! The server exposes no acknowledgement bytes on the control channels, so
//! the clients here are thin encoders over [`awg_protocol`]. Feedback about
//! list lifecycles arrives exclusively through [`StatusClient`].
//!
//! ## Basic Usage
//!
//! ### Staging and playing a list
//!
//! ```ignore
//! use awg_client::QueueClient;
//!
//! let mut queue = QueueClient::connect("192.168.1.10:9100")?;
//! queue.preload_begin(0, 2)?;
//! queue.preload_push(0, &[0xABCD_0001])?;
//! queue.preload_push(0, &[0xABCD_0002])?;
//! // The final push finalized the list; playback starts automatically.
//! ```
//!
//! ### Watching list transitions
//!
//! ```ignore
//! use awg_client::StatusClient;
//!
//! let mut status = StatusClient::connect("192.168.1.10:9101")?;
//! // The first two lines always report the current state of both lists.
//! let (list, state) = status.next_status()?;
//! println!("list {} is {}", list, state);
//! ```
//!
//! ### Immediate control
//!
//! ```ignore
//! use awg_client::DirectClient;
//! use awg_protocol::word;
//!
//! let mut direct = DirectClient::connect("192.168.1.10:9000")?;
//! direct.send_frame(&[word::gain_word(0, 0, 0x1FFFF), word::commit_word()])?;
//! ```
//!
//! ## Related Crates
//!
//! - [`awg_protocol`] - wire formats and command-word packing
use std::io::{self, BufRead, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use awg_protocol::{codec, error::ProtocolError, Command, ListState};

/// Client for the queued playback endpoint.
///
/// Commands take effect in the order written. The server answers nothing on
/// this socket; subscribe to the notification endpoint for feedback.
pub struct QueueClient {
    tcp: TcpStream,
}

impl QueueClient {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<QueueClient> {
        Ok(QueueClient {
            tcp: TcpStream::connect(addr)?,
        })
    }

    /// Declares a preload of `total_frames` frames into list `list`.
    pub fn preload_begin(&mut self, list: u8, total_frames: u32) -> Result<(), ProtocolError> {
        Command::PreloadBegin { list, total_frames }.write_to(&mut self.tcp)
    }

    /// Appends one frame of 1..=64 words to list `list`. The push reaching
    /// the declared total finalizes the list and may start playback.
    pub fn preload_push(&mut self, list: u8, words: &[u32]) -> Result<(), ProtocolError> {
        Command::PreloadPush {
            list,
            words: words.into(),
        }
        .write_to(&mut self.tcp)
    }

    /// Finalizes a partially loaded list. A no-op if the list is already
    /// ready.
    pub fn preload_end(&mut self, list: u8) -> Result<(), ProtocolError> {
        Command::PreloadEnd { list }.write_to(&mut self.tcp)
    }

    /// Drains both lists to silence and clears them. The server reports both
    /// lists idle once the hardware has settled.
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        Command::Reset.write_to(&mut self.tcp)
    }

    /// Requests a reset followed by a host poweroff, where the server build
    /// allows it.
    pub fn shutdown_host(&mut self) -> Result<(), ProtocolError> {
        Command::Shutdown.write_to(&mut self.tcp)
    }

    /// Convenience: begin, push every frame, and end, in one call.
    pub fn load_list(&mut self, list: u8, frames: &[&[u32]]) -> Result<(), ProtocolError> {
        self.preload_begin(list, frames.len() as u32)?;
        for frame in frames {
            self.preload_push(list, frame)?;
        }
        self.preload_end(list)
    }
}

/// Client for the direct passthrough endpoint.
pub struct DirectClient {
    tcp: TcpStream,
}

impl DirectClient {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<DirectClient> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        Ok(DirectClient { tcp })
    }

    /// Sends one frame of 1..=64 words for immediate application.
    ///
    /// Note the server drops direct connections that stay silent longer than
    /// its per-read timeout; reconnect on failure.
    pub fn send_frame(&mut self, words: &[u32]) -> Result<(), ProtocolError> {
        codec::write_frame(&mut self.tcp, words)
    }
}

/// Client for the status notification endpoint.
///
/// On connect the server always sends the current state of both lists,
/// followed by one line per state change.
pub struct StatusClient {
    reader: BufReader<TcpStream>,
}

impl StatusClient {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<StatusClient> {
        Ok(StatusClient {
            reader: BufReader::new(TcpStream::connect(addr)?),
        })
    }

    /// Bounds how long [`StatusClient::next_status`] blocks waiting for a
    /// line.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)
    }

    /// Blocks until the next status line and returns the list id and its new
    /// state.
    pub fn next_status(&mut self) -> Result<(u8, ListState), ProtocolError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(ProtocolError::PeerClosed);
        }
        codec::parse_status_line(&line)
    }
}
