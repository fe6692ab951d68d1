//! # AWG Protocol Library
//!
//! This crate implements the wire protocols spoken by the AWG control server,
//! which drives an FPGA-based arbitrary-waveform generator with packed 32-bit
//! command words.
//!
//! ## Overview
//!
//! Clients talk to the server over three TCP endpoints, and this library
//! provides the byte formats for all of them:
//!
//! - **Queued endpoint**: opcode-tagged records ([`Command`]) that stage
//!   frames into a double-buffered playback queue
//! - **Direct endpoint**: count-prefixed frames of raw command words applied
//!   immediately ([`codec::read_frame`] / [`codec::write_frame`])
//! - **Notification endpoint**: text lines reporting per-list state changes
//!   ([`codec::status_line`] / [`codec::parse_status_line`])
//!
//! The [`word`] module packs and unpacks the command words themselves.
//!
//! ## Record Formats
//!
//! All integers are big-endian on the wire. No record carries an
//! acknowledgement; the notification endpoint is the only feedback channel.
//!
//! - **PreloadBegin**: `'B' <list: u8> <total_frames: u32>`
//! - **PreloadPush**: `'P' <list: u8> <count: u16> <count x u32>`
//! - **PreloadEnd**: `'E' <list: u8>`
//! - **Reset**: `'Z'`
//! - **Shutdown**: `'X'`
//! - **Direct frame**: `<count: u16> <count x u32>`
//! - **Status line**: `LIST<id>:<IDLE|LOADING|READY>\n`
//!
//! ## Basic Usage
//!
//! ### Encoding a command
//!
//! ```
//! use awg_protocol::Command;
//!
//! let cmd = Command::PreloadBegin { list: 0, total_frames: 3 };
//! let mut buffer = Vec::new();
//! cmd.write_to(&mut buffer).expect("Writing to a vector shouldn't fail");
//! assert_eq!(buffer, b"B\x00\x00\x00\x00\x03");
//! ```
//!
//! ### Decoding a command
//!
//! ```
//! use awg_protocol::Command;
//! use std::io::Cursor;
//!
//! let data = b"P\x00\x00\x01\xAB\xCD\x00\x01";
//! let cmd = Command::from_reader(&mut Cursor::new(data)).expect("Record should parse");
//! assert_eq!(
//!     cmd,
//!     Command::PreloadPush { list: 0, words: vec![0xABCD_0001].into_boxed_slice() }
//! );
//! ```
//!
//! ### Packing command words
//!
//! ```
//! use awg_protocol::word;
//!
//! let w = word::gain_word(1, 3, 0x1FFFF);
//! assert_eq!(word::opcode(w), word::OP_GAIN);
//! assert_eq!(word::channel(w), 1);
//! assert_eq!(word::tone(w), 3);
//! ```
//!
//! ## Error Handling
//!
//! Parsing failures are reported through [`error::ProtocolError`]. Servers
//! treat every protocol error as fatal for the connection that produced it.
//!
//! ## Thread Safety
//!
//! The types in this library are plain data and are safe to share across
//! threads. I/O operations are not synchronized and require external
//! coordination.

pub mod command;
pub use command::*;
pub mod codec;
pub mod error;
pub mod word;
