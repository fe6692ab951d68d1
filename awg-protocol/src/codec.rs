//! Read and write implementations for the wire protocols.
//!
//! Three byte formats live here: the opcode-tagged records of the queued
//! endpoint, the count-prefixed frames of the direct endpoint, and the text
//! status lines of the notification endpoint. All multi-byte integers are
//! big-endian on the wire.
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    command::{Command, ListState, MAX_TOTAL_FRAMES, MAX_WORDS_PER_FRAME},
    error::ProtocolError,
};

const STATUS_PREFIX: &str = "LIST";

fn read_list_id(reader: &mut impl Read) -> Result<u8, ProtocolError> {
    let id = reader.read_u8()?;
    if id > 1 {
        return Err(ProtocolError::InvalidListId(id));
    }
    Ok(id)
}

impl Command {
    /// Reads exactly one command record from `reader`.
    ///
    /// Header fields are validated before any frame payload is read, so a
    /// record with an out-of-range word count fails without consuming its
    /// payload bytes. Callers treat any error as fatal for the connection.
    pub fn from_reader(reader: &mut impl Read) -> Result<Command, ProtocolError> {
        let tag = reader.read_u8()?;
        match tag {
            b'B' => {
                let list = read_list_id(reader)?;
                let total_frames = reader.read_u32::<BigEndian>()?;
                if total_frames == 0 || total_frames > MAX_TOTAL_FRAMES {
                    return Err(ProtocolError::InvalidFrameCount(total_frames));
                }
                Ok(Command::PreloadBegin { list, total_frames })
            }
            b'P' => {
                let list = read_list_id(reader)?;
                let count = reader.read_u16::<BigEndian>()?;
                if count == 0 || count as usize > MAX_WORDS_PER_FRAME {
                    return Err(ProtocolError::InvalidWordCount(count));
                }
                let mut words = vec![0u32; count as usize].into_boxed_slice();
                reader.read_u32_into::<BigEndian>(&mut words)?;
                Ok(Command::PreloadPush { list, words })
            }
            b'E' => {
                let list = read_list_id(reader)?;
                Ok(Command::PreloadEnd { list })
            }
            b'Z' => Ok(Command::Reset),
            b'X' => Ok(Command::Shutdown),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }

    /// Writes this command in wire format.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), ProtocolError> {
        writer.write_u8(self.tag())?;
        match self {
            Command::PreloadBegin { list, total_frames } => {
                if *total_frames == 0 || *total_frames > MAX_TOTAL_FRAMES {
                    return Err(ProtocolError::InvalidFrameCount(*total_frames));
                }
                writer.write_u8(*list)?;
                writer.write_u32::<BigEndian>(*total_frames)?;
            }
            Command::PreloadPush { list, words } => {
                if words.is_empty() || words.len() > MAX_WORDS_PER_FRAME {
                    return Err(ProtocolError::InvalidWordCount(words.len() as u16));
                }
                writer.write_u8(*list)?;
                writer.write_u16::<BigEndian>(words.len() as u16)?;
                for &w in words.iter() {
                    writer.write_u32::<BigEndian>(w)?;
                }
            }
            Command::PreloadEnd { list } => {
                writer.write_u8(*list)?;
            }
            Command::Reset | Command::Shutdown => {}
        }
        Ok(())
    }
}

/// Reads one direct-endpoint frame: `u16 count` followed by `count` words.
pub fn read_frame(reader: &mut impl Read) -> Result<Box<[u32]>, ProtocolError> {
    let count = reader.read_u16::<BigEndian>()?;
    if count == 0 || count as usize > MAX_WORDS_PER_FRAME {
        return Err(ProtocolError::InvalidWordCount(count));
    }
    let mut words = vec![0u32; count as usize].into_boxed_slice();
    reader.read_u32_into::<BigEndian>(&mut words)?;
    Ok(words)
}

/// Writes one direct-endpoint frame.
pub fn write_frame(writer: &mut impl Write, words: &[u32]) -> Result<(), ProtocolError> {
    if words.is_empty() || words.len() > MAX_WORDS_PER_FRAME {
        return Err(ProtocolError::InvalidWordCount(words.len() as u16));
    }
    writer.write_u16::<BigEndian>(words.len() as u16)?;
    for &w in words {
        writer.write_u32::<BigEndian>(w)?;
    }
    Ok(())
}

/// Formats one notification line, newline included.
pub fn status_line(list: u8, state: ListState) -> String {
    format!("{}{}:{}\n", STATUS_PREFIX, list, state)
}

/// Parses one notification line (with or without the trailing newline).
pub fn parse_status_line(line: &str) -> Result<(u8, ListState), ProtocolError> {
    let bad = || ProtocolError::InvalidStatusLine(line.to_string());
    let rest = line
        .trim_end_matches('\n')
        .strip_prefix(STATUS_PREFIX)
        .ok_or_else(bad)?;
    let (id_part, state_part) = rest.split_once(':').ok_or_else(bad)?;
    let list = match id_part {
        "0" => 0,
        "1" => 1,
        _ => return Err(bad()),
    };
    let state = match state_part {
        "IDLE" => ListState::Idle,
        "LOADING" => ListState::Loading,
        "READY" => ListState::Ready,
        _ => return Err(bad()),
    };
    Ok((list, state))
}

#[test]
fn status_line_round_trip() {
    let line = status_line(1, ListState::Loading);
    assert_eq!(line, "LIST1:LOADING\n");
    assert_eq!(parse_status_line(&line).unwrap(), (1, ListState::Loading));
}

#[test]
fn status_line_rejects_garbage() {
    assert!(parse_status_line("LIST2:IDLE").is_err());
    assert!(parse_status_line("LIST0:BUSY").is_err());
    assert!(parse_status_line("STATUS0:IDLE").is_err());
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn round_trip(cmd: Command) -> Command {
        let mut out = Vec::new();
        cmd.write_to(&mut out).unwrap();
        Command::from_reader(&mut Cursor::new(out)).unwrap()
    }

    #[test]
    fn read_preload_begin() {
        let data = b"B\x00\x00\x00\x00\x03";
        let cmd = Command::from_reader(&mut Cursor::new(data)).unwrap();
        assert_eq!(
            cmd,
            Command::PreloadBegin {
                list: 0,
                total_frames: 3
            }
        );
    }

    #[test]
    fn write_preload_begin() {
        let mut out = Vec::new();
        Command::PreloadBegin {
            list: 1,
            total_frames: 0x0102_0304,
        }
        .write_to(&mut out)
        .unwrap();
        assert_eq!(out, b"B\x01\x01\x02\x03\x04");
    }

    #[test]
    fn push_round_trip() {
        let cmd = Command::PreloadPush {
            list: 1,
            words: vec![0xABCD_0001, 0xABCD_0002].into_boxed_slice(),
        };
        assert_eq!(round_trip(cmd.clone()), cmd);
    }

    #[test]
    fn push_wire_layout_is_big_endian() {
        let mut out = Vec::new();
        Command::PreloadPush {
            list: 0,
            words: vec![0xABCD_0001].into_boxed_slice(),
        }
        .write_to(&mut out)
        .unwrap();
        assert_eq!(out, b"P\x00\x00\x01\xAB\xCD\x00\x01");
    }

    #[test]
    fn tagged_commands_round_trip() {
        assert_eq!(
            round_trip(Command::PreloadEnd { list: 1 }),
            Command::PreloadEnd { list: 1 }
        );
        assert_eq!(round_trip(Command::Reset), Command::Reset);
        assert_eq!(round_trip(Command::Shutdown), Command::Shutdown);
    }

    #[test]
    fn invalid_tag() {
        match Command::from_reader(&mut Cursor::new(b"Q".to_vec())) {
            Err(ProtocolError::InvalidTag(t)) => assert_eq!(t, b'Q'),
            other => panic!("expected InvalidTag, got {:?}", other),
        }
    }

    #[test]
    fn invalid_list_id() {
        match Command::from_reader(&mut Cursor::new(b"E\x02".to_vec())) {
            Err(ProtocolError::InvalidListId(2)) => {}
            other => panic!("expected InvalidListId, got {:?}", other),
        }
    }

    #[test]
    fn zero_word_count_rejected_before_payload() {
        let data = b"P\x00\x00\x00";
        match Command::from_reader(&mut Cursor::new(data.to_vec())) {
            Err(ProtocolError::InvalidWordCount(0)) => {}
            other => panic!("expected InvalidWordCount, got {:?}", other),
        }
    }

    #[test]
    fn overlength_frame_rejected_before_payload() {
        // 65 words declared, none present: the header alone must fail.
        let data = b"P\x01\x00\x41";
        match Command::from_reader(&mut Cursor::new(data.to_vec())) {
            Err(ProtocolError::InvalidWordCount(65)) => {}
            other => panic!("expected InvalidWordCount, got {:?}", other),
        }
    }

    #[test]
    fn frame_total_bounds() {
        let mut over = b"B\x00".to_vec();
        over.extend_from_slice(&(MAX_TOTAL_FRAMES + 1).to_be_bytes());
        assert!(matches!(
            Command::from_reader(&mut Cursor::new(over)),
            Err(ProtocolError::InvalidFrameCount(_))
        ));
        let zero = b"B\x00\x00\x00\x00\x00".to_vec();
        assert!(matches!(
            Command::from_reader(&mut Cursor::new(zero)),
            Err(ProtocolError::InvalidFrameCount(0))
        ));
    }

    #[test]
    fn truncated_record_is_peer_closed() {
        let data = b"B\x00\x00\x00";
        match Command::from_reader(&mut Cursor::new(data.to_vec())) {
            Err(ProtocolError::PeerClosed) => {}
            other => panic!("expected PeerClosed, got {:?}", other),
        }
    }

    #[test]
    fn direct_frame_round_trip() {
        let words = [0xDEAD_BEEF, 0x0000_0001];
        let mut out = Vec::new();
        write_frame(&mut out, &words).unwrap();
        assert_eq!(out, b"\x00\x02\xDE\xAD\xBE\xEF\x00\x00\x00\x01");
        let back = read_frame(&mut Cursor::new(out)).unwrap();
        assert_eq!(&back[..], &words[..]);
    }

    #[test]
    fn direct_frame_count_bounds() {
        assert!(matches!(
            read_frame(&mut Cursor::new(b"\x00\x00".to_vec())),
            Err(ProtocolError::InvalidWordCount(0))
        ));
        assert!(matches!(
            read_frame(&mut Cursor::new(b"\x00\x41".to_vec())),
            Err(ProtocolError::InvalidWordCount(65))
        ));
        let too_long = vec![0u32; 65];
        assert!(write_frame(&mut Vec::new(), &too_long).is_err());
    }
}
