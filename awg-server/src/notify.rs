//! Out-of-band status notification endpoint.
//!
//! At most one subscriber is attached at any time; a new connection replaces
//! the previous one. On attach the subscriber receives the current state of
//! both lists, then one line per state change. Sends are best-effort and
//! non-blocking; a failed send drops the subscriber.

use std::io::{ErrorKind, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use awg_protocol::{codec, ListState, NUM_LISTS};

use crate::ACCEPT_POLL;

struct NotifyInner {
    subscriber: Option<TcpStream>,
    status: [ListState; NUM_LISTS],
    last_sent: [Option<ListState>; NUM_LISTS],
}

/// Shared status state: the per-list status array plus the subscriber slot,
/// all guarded by one lock.
///
/// Lock ordering: callers may hold the player lock while publishing here;
/// nothing in this module ever acquires the player lock.
pub(crate) struct StatusBoard {
    inner: Mutex<NotifyInner>,
}

impl StatusBoard {
    pub fn new() -> StatusBoard {
        StatusBoard {
            inner: Mutex::new(NotifyInner {
                subscriber: None,
                status: [ListState::Idle; NUM_LISTS],
                last_sent: [None; NUM_LISTS],
            }),
        }
    }

    /// Records a list state and pushes a line to the subscriber if the state
    /// differs from the last one sent to it.
    pub fn publish(&self, list: u8, state: ListState) {
        let mut inner = self.inner.lock();
        inner.status[list as usize] = state;
        Self::flush_line(&mut inner, list);
    }

    fn flush_line(inner: &mut NotifyInner, list: u8) {
        let state = inner.status[list as usize];
        if inner.last_sent[list as usize] == Some(state) {
            return;
        }
        let Some(stream) = inner.subscriber.as_mut() else {
            return;
        };
        let line = codec::status_line(list, state);
        match stream.write_all(line.as_bytes()) {
            Ok(()) => {
                log::debug!("Sent notification: {}", line.trim_end());
                inner.last_sent[list as usize] = Some(state);
            }
            Err(e) => {
                log::info!("Dropping status subscriber: {}", e);
                inner.subscriber = None;
            }
        }
    }

    /// Installs `stream` as the sole subscriber, replacing any previous one,
    /// and sends it the current state of both lists.
    pub fn attach(&self, stream: TcpStream) {
        if let Err(e) = stream.set_nonblocking(true) {
            log::error!("Failed to configure subscriber socket: {}", e);
            return;
        }
        let mut inner = self.inner.lock();
        inner.subscriber = Some(stream);
        inner.last_sent = [None; NUM_LISTS];
        for list in 0..NUM_LISTS as u8 {
            Self::flush_line(&mut inner, list);
        }
    }

    /// Closes and forgets the subscriber, if any.
    pub fn close_subscriber(&self) {
        let mut inner = self.inner.lock();
        if let Some(stream) = inner.subscriber.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Accept loop for the notification endpoint. The listener must be
/// non-blocking; the loop polls it until `stop` is raised.
pub(crate) fn run_notify_acceptor(
    listener: TcpListener,
    status: Arc<StatusBoard>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Status subscriber connected from {}", peer);
                status.attach(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Status accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::debug!("Status accept loop exiting");
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    fn attached_board() -> (StatusBoard, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let board = StatusBoard::new();
        board.attach(server_side);
        (board, client)
    }

    fn read_available(client: &mut TcpStream, expected_len: usize) -> String {
        let mut buf = vec![0u8; expected_len];
        client.read_exact(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn attach_sends_both_current_states() {
        let (_board, mut client) = attached_board();
        let initial = read_available(&mut client, "LIST0:IDLE\nLIST1:IDLE\n".len());
        assert_eq!(initial, "LIST0:IDLE\nLIST1:IDLE\n");
    }

    #[test]
    fn duplicate_states_are_suppressed() {
        let (board, mut client) = attached_board();
        read_available(&mut client, "LIST0:IDLE\nLIST1:IDLE\n".len());

        board.publish(0, ListState::Loading);
        board.publish(0, ListState::Loading);
        board.publish(0, ListState::Ready);
        let lines = read_available(&mut client, "LIST0:LOADING\nLIST0:READY\n".len());
        assert_eq!(lines, "LIST0:LOADING\nLIST0:READY\n");
    }

    #[test]
    fn late_subscriber_sees_current_state_only() {
        let board = StatusBoard::new();
        board.publish(1, ListState::Loading);
        board.publish(1, ListState::Ready);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let (server_side, _) = listener.accept().unwrap();
        board.attach(server_side);

        let lines = read_available(&mut client, "LIST0:IDLE\nLIST1:READY\n".len());
        assert_eq!(lines, "LIST0:IDLE\nLIST1:READY\n");
    }
}
