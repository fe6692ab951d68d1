//! The direct passthrough endpoint.
//!
//! Stateless low-latency path: each frame read from the socket goes straight
//! to the hardware through the shared HW mutex, so direct writes and player
//! ticks never interleave within a frame. Multiple concurrent connections are
//! allowed, each served by a short-lived detached thread.

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::sys::socket::{setsockopt, sockopt};
use parking_lot::Mutex;

use awg_protocol::codec;

use crate::{AwgDevice, ACCEPT_POLL};

/// Receive buffer large enough to absorb bursts of back-to-back frames.
const SOCK_RCVBUF: usize = 256 * 1024;

/// Accept loop for the direct endpoint. The listener must be non-blocking.
pub(crate) fn run_direct_acceptor<D: AwgDevice + Send + 'static>(
    listener: TcpListener,
    hw: Arc<Mutex<D>>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Direct client connected from {}", peer);
                let hw = Arc::clone(&hw);
                let stop = Arc::clone(&stop);
                thread::spawn(move || serve_client(stream, hw, stop, read_timeout));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Direct accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::debug!("Direct accept loop exiting");
}

fn serve_client<D: AwgDevice>(
    mut stream: TcpStream,
    hw: Arc<Mutex<D>>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    let configured = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_nodelay(true))
        .and_then(|_| stream.set_read_timeout(Some(read_timeout)));
    if let Err(e) = configured {
        log::error!("Failed to configure direct client socket: {}", e);
        return;
    }
    if let Err(e) = setsockopt(&stream, sockopt::RcvBuf, &SOCK_RCVBUF) {
        log::debug!("Could not enlarge receive buffer: {}", e);
    }

    while !stop.load(Ordering::Acquire) {
        match codec::read_frame(&mut stream) {
            Ok(words) => {
                hw.lock().send_words(&words);
            }
            Err(e) if e.is_timeout() => {
                log::debug!("Direct client read timeout, dropping connection");
                break;
            }
            Err(e) if e.is_disconnect() => {
                log::debug!("Direct client disconnected");
                break;
            }
            Err(e) => {
                log::warn!("Bad direct frame, dropping connection: {}", e);
                break;
            }
        }
    }
}
