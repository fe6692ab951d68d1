//! The queued playback endpoint.
//!
//! A single controlling client at a time streams opcode-tagged records that
//! stage frames into the ping-pong lists. A newly accepted connection
//! replaces the active one. Any protocol error, timeout, or disconnect drops
//! the connection and rolls its unfinished preloads back to `Idle`.

use std::io::ErrorKind;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use awg_protocol::{Command, ListState, NUM_LISTS};

use crate::list::ListError;
use crate::notify::StatusBoard;
use crate::player::{start_if_idle, Playback};
use crate::ACCEPT_POLL;

/// Shared handles the queue endpoint needs to do its work.
pub(crate) struct QueueCtx {
    pub playback: Arc<Playback>,
    pub status: Arc<StatusBoard>,
    pub stop: Arc<AtomicBool>,
    pub read_timeout: Duration,
    pub flush_frames: u32,
}

impl Clone for QueueCtx {
    fn clone(&self) -> Self {
        QueueCtx {
            playback: Arc::clone(&self.playback),
            status: Arc::clone(&self.status),
            stop: Arc::clone(&self.stop),
            read_timeout: self.read_timeout,
            flush_frames: self.flush_frames,
        }
    }
}

/// Accept loop for the queued endpoint. The listener must be non-blocking.
///
/// The serving thread of the previous client is shut down and joined before a
/// new client takes over, so list mutations from two clients never interleave.
pub(crate) fn run_queue_acceptor(listener: TcpListener, ctx: QueueCtx) {
    let mut active: Option<(TcpStream, JoinHandle<()>)> = None;
    while !ctx.stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Queue client connected from {}", peer);
                if let Some((old, handle)) = active.take() {
                    log::info!("Replacing previous queue client");
                    let _ = old.shutdown(Shutdown::Both);
                    let _ = handle.join();
                }
                let control = match stream.try_clone() {
                    Ok(c) => c,
                    Err(e) => {
                        log::error!("Failed to clone client socket, refusing client: {}", e);
                        continue;
                    }
                };
                let ctx2 = ctx.clone();
                let handle = thread::spawn(move || serve_client(stream, ctx2));
                active = Some((control, handle));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Queue accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    if let Some((old, handle)) = active.take() {
        let _ = old.shutdown(Shutdown::Both);
        let _ = handle.join();
    }
    log::debug!("Queue accept loop exiting");
}

fn serve_client(mut stream: TcpStream, ctx: QueueCtx) {
    let configured = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(ctx.read_timeout)));
    if let Err(e) = configured {
        log::error!("Failed to configure client socket: {}", e);
        return;
    }

    // Lists this connection has begun loading but not yet finalized.
    let mut loading = [false; NUM_LISTS];
    loop {
        match Command::from_reader(&mut stream) {
            Ok(cmd) => {
                if let Err(e) = apply(cmd, &mut loading, &ctx) {
                    log::warn!("Dropping queue client: {}", e);
                    break;
                }
            }
            Err(e) if e.is_timeout() => {
                log::warn!("Queue client read timeout, dropping connection");
                break;
            }
            Err(e) if e.is_disconnect() => {
                log::info!("Queue client disconnected");
                break;
            }
            Err(e) => {
                log::warn!("Protocol error, dropping queue client: {}", e);
                break;
            }
        }
        if ctx.stop.load(Ordering::Acquire) {
            break;
        }
    }
    cancel_pending(&loading, &ctx);
}

fn apply(cmd: Command, loading: &mut [bool; NUM_LISTS], ctx: &QueueCtx) -> Result<(), ListError> {
    match cmd {
        Command::PreloadBegin { list, total_frames } => {
            let id = list as usize;
            let mut s = ctx.playback.state.lock();
            s.lists[id].prepare(total_frames)?;
            ctx.status.publish(list, ListState::Loading);
            drop(s);
            loading[id] = true;
            log::debug!("Preload begin: list {} expects {} frames", id, total_frames);
            Ok(())
        }
        Command::PreloadPush { list, words } => {
            let id = list as usize;
            let mut s = ctx.playback.state.lock();
            s.lists[id].push(&words)?;
            if s.lists[id].loaded_frames() == s.lists[id].total_frames() {
                s.lists[id].finalize()?;
                loading[id] = false;
                // Ready must reach the wire before the player can emit the
                // first frame, hence published under the player lock.
                ctx.status.publish(list, ListState::Ready);
                start_if_idle(&mut s, id);
                log::debug!("List {} fully loaded and ready", id);
            }
            Ok(())
        }
        Command::PreloadEnd { list } => {
            let id = list as usize;
            let mut s = ctx.playback.state.lock();
            s.lists[id].finalize()?;
            loading[id] = false;
            ctx.status.publish(list, ListState::Ready);
            start_if_idle(&mut s, id);
            log::debug!(
                "List {} finalized with {} frames",
                id,
                s.lists[id].loaded_frames()
            );
            Ok(())
        }
        Command::Reset => {
            do_reset(loading, ctx);
            Ok(())
        }
        Command::Shutdown => {
            log::warn!("Host shutdown requested over the wire");
            do_reset(loading, ctx);
            request_poweroff();
            Ok(())
        }
    }
}

/// Drains both lists to silence, clears them, and reports both `Idle`. The
/// hardware has settled to zero gain before any status line is emitted.
fn do_reset(loading: &mut [bool; NUM_LISTS], ctx: &QueueCtx) {
    log::info!("Reset: draining both lists to silence");
    for id in 0..NUM_LISTS {
        if let Err(e) = ctx.playback.drain_silence(id, ctx.flush_frames) {
            log::error!("Failed to stage drain frames for list {}: {}", id, e);
        }
    }
    let mut s = ctx.playback.state.lock();
    for list in &mut s.lists {
        list.clear();
    }
    s.playing = false;
    s.cur_list = 0;
    s.next_list = 1;
    s.cur_frame = 0;
    drop(s);
    for id in 0..NUM_LISTS as u8 {
        ctx.status.publish(id, ListState::Idle);
    }
    *loading = [false; NUM_LISTS];
}

#[cfg(feature = "host-poweroff")]
fn request_poweroff() {
    log::warn!("Powering off the host");
    if let Err(e) = std::process::Command::new("poweroff").status() {
        log::error!("Failed to run poweroff: {}", e);
    }
}

#[cfg(not(feature = "host-poweroff"))]
fn request_poweroff() {
    log::warn!("Host poweroff is not enabled in this build, reset performed only");
}

/// Rolls back preloads the connection started but never finalized.
fn cancel_pending(loading: &[bool; NUM_LISTS], ctx: &QueueCtx) {
    for (id, &in_progress) in loading.iter().enumerate() {
        if !in_progress {
            continue;
        }
        log::warn!("Cancelling unfinished preload on list {}", id);
        let mut s = ctx.playback.state.lock();
        s.lists[id].clear();
        drop(s);
        ctx.status.publish(id as u8, ListState::Idle);
    }
}
