use std::io::{self, ErrorKind};

/// Errors that may occur when reading or writing protocol records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// An I/O failure on the underlying stream, including read timeouts.
    #[error("{0}")]
    Io(io::Error),
    /// The peer closed the connection cleanly.
    #[error("peer closed the connection")]
    PeerClosed,
    /// An unknown opcode tag was received.
    #[error("invalid command tag 0x{0:02x}")]
    InvalidTag(u8),
    /// A list id outside {0, 1}.
    #[error("invalid list id {0}")]
    InvalidListId(u8),
    /// A frame word count outside 1..=64.
    #[error("invalid word count {0}")]
    InvalidWordCount(u16),
    /// A preload frame total outside the accepted range.
    #[error("invalid frame total {0}")]
    InvalidFrameCount(u32),
    /// A malformed status line on the notification stream.
    #[error("invalid status line {0:?}")]
    InvalidStatusLine(String),
}

impl From<io::Error> for ProtocolError {
    fn from(value: io::Error) -> Self {
        // A clean EOF in the middle of a record is indistinguishable from one
        // between records at this layer; both mean the peer went away.
        if value.kind() == ErrorKind::UnexpectedEof {
            ProtocolError::PeerClosed
        } else {
            ProtocolError::Io(value)
        }
    }
}

impl ProtocolError {
    /// True if this error is a per-read timeout on a socket.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e)
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut
        )
    }

    /// True if this error means the peer is gone rather than misbehaving.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::PeerClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eof_maps_to_peer_closed() {
        let e: ProtocolError = io::Error::new(ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(e, ProtocolError::PeerClosed));
        assert!(e.is_disconnect());
    }

    #[test]
    fn timeout_classification() {
        let e: ProtocolError = io::Error::new(ErrorKind::WouldBlock, "timeout").into();
        assert!(e.is_timeout());
        assert!(!e.is_disconnect());
    }

    #[test]
    fn reset_classification() {
        let e: ProtocolError = io::Error::new(ErrorKind::ConnectionReset, "reset").into();
        assert!(e.is_disconnect());
        assert!(!e.is_timeout());
    }
}
