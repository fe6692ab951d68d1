//! Server aggregate and lifecycle orchestration.
//!
//! [`AwgServer`] owns the three TCP endpoints, the player thread, and the
//! device behind the HW mutex. Startup primes the PL with silence before any
//! client can connect; shutdown drains it back to silence before the device
//! is released, so the hardware is never left mid-waveform.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use awg_protocol::NUM_LISTS;

use crate::direct::run_direct_acceptor;
use crate::notify::{run_notify_acceptor, StatusBoard};
use crate::player::{run_player, Playback};
use crate::queue::{run_queue_acceptor, QueueCtx};
use crate::AwgDevice;

/// Server configuration. Defaults match the deployed peripheral setup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the three listeners bind to.
    pub bind_addr: IpAddr,
    /// Port of the direct passthrough endpoint.
    pub direct_port: u16,
    /// Port of the queued playback endpoint.
    pub queue_port: u16,
    /// Port of the status notification endpoint.
    pub notify_port: u16,
    /// Player tick period.
    pub period: Duration,
    /// Zero-gain frames used to prime and flush each PL buffer.
    pub flush_frames: u32,
    /// Per-read timeout on the queued endpoint.
    pub queue_read_timeout: Duration,
    /// Per-read timeout on the direct endpoint.
    pub direct_read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            direct_port: 9000,
            queue_port: 9100,
            notify_port: 9101,
            period: Duration::from_micros(1000),
            flush_frames: 100,
            queue_read_timeout: Duration::from_secs(5),
            direct_read_timeout: Duration::from_millis(100),
        }
    }
}

/// Builder to create an [`AwgServer`] and modify configuration options
///
/// # Example
///
/// ```ignore
/// use awg_server::Builder;
/// use std::time::Duration;
///
/// let handle = Builder::new()
///     .period(Duration::from_micros(500))
///     .flush_frames(50)
///     .start(my_device)?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the address the listeners bind to.
    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the direct endpoint port (0 picks an ephemeral port).
    pub fn direct_port(mut self, port: u16) -> Self {
        self.config.direct_port = port;
        self
    }

    /// Set the queued endpoint port (0 picks an ephemeral port).
    pub fn queue_port(mut self, port: u16) -> Self {
        self.config.queue_port = port;
        self
    }

    /// Set the notification endpoint port (0 picks an ephemeral port).
    pub fn notify_port(mut self, port: u16) -> Self {
        self.config.notify_port = port;
        self
    }

    /// Set the player tick period.
    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Set how many zero-gain frames prime and flush each PL buffer.
    pub fn flush_frames(mut self, frames: u32) -> Self {
        self.config.flush_frames = frames;
        self
    }

    /// Set the per-read timeout of the queued endpoint.
    pub fn queue_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_read_timeout = timeout;
        self
    }

    /// Set the per-read timeout of the direct endpoint.
    pub fn direct_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.direct_read_timeout = timeout;
        self
    }

    /// Build the server around `device` and start it.
    pub fn start<D: AwgDevice + Send + 'static>(
        self,
        device: D,
    ) -> Result<ServerHandle<D>, StartError> {
        AwgServer::new(device, self.config).start()
    }
}

/// Which part of startup failed, with the launcher exit code it maps to.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to start player thread: {0}")]
    Player(io::Error),
    #[error("failed to bind direct listener: {0}")]
    Direct(io::Error),
    #[error("failed to bind queued listener: {0}")]
    Queue(io::Error),
    #[error("failed to bind status listener: {0}")]
    Notify(io::Error),
}

impl StartError {
    /// Process exit code reported by the launcher for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartError::Player(_) => 1,
            StartError::Direct(_) => 2,
            StartError::Queue(_) => 3,
            StartError::Notify(_) => 4,
        }
    }
}

/// The assembled but not yet started server.
pub struct AwgServer<D: AwgDevice + Send + 'static> {
    hw: Arc<Mutex<D>>,
    config: Config,
}

impl<D: AwgDevice + Send + 'static> AwgServer<D> {
    pub fn new(device: D, config: Config) -> AwgServer<D> {
        AwgServer {
            hw: Arc::new(Mutex::new(device)),
            config,
        }
    }

    /// Starts the server: player thread first, then PL priming, then the
    /// three listeners. Returns once all endpoints accept connections.
    pub fn start(self) -> Result<ServerHandle<D>, StartError> {
        let config = self.config;
        let playback = Arc::new(Playback::new(config.period));
        let status = Arc::new(StatusBoard::new());
        let accept_stop = Arc::new(AtomicBool::new(false));
        let player_stop = Arc::new(AtomicBool::new(false));

        let player_thread = thread::Builder::new()
            .name("awg-player".into())
            .spawn({
                let playback = Arc::clone(&playback);
                let status = Arc::clone(&status);
                let hw = Arc::clone(&self.hw);
                let stop = Arc::clone(&player_stop);
                move || run_player(playback, status, hw, stop)
            })
            .map_err(StartError::Player)?;

        for id in 0..NUM_LISTS {
            log::info!("Priming PL buffer for list {}", id);
            if let Err(e) = playback.drain_silence(id, config.flush_frames) {
                log::error!("Failed to prime list {}: {}", id, e);
            }
        }
        log::info!("PL priming complete");

        let notify_listener =
            bind(config.bind_addr, config.notify_port).map_err(StartError::Notify)?;
        let notify_addr = notify_listener.local_addr().map_err(StartError::Notify)?;
        let queue_listener =
            bind(config.bind_addr, config.queue_port).map_err(StartError::Queue)?;
        let queue_addr = queue_listener.local_addr().map_err(StartError::Queue)?;
        let direct_listener =
            bind(config.bind_addr, config.direct_port).map_err(StartError::Direct)?;
        let direct_addr = direct_listener.local_addr().map_err(StartError::Direct)?;

        let mut accept_threads = Vec::with_capacity(3);
        accept_threads.push(
            thread::Builder::new()
                .name("awg-notify".into())
                .spawn({
                    let status = Arc::clone(&status);
                    let stop = Arc::clone(&accept_stop);
                    move || run_notify_acceptor(notify_listener, status, stop)
                })
                .map_err(StartError::Notify)?,
        );
        accept_threads.push(
            thread::Builder::new()
                .name("awg-queue".into())
                .spawn({
                    let ctx = QueueCtx {
                        playback: Arc::clone(&playback),
                        status: Arc::clone(&status),
                        stop: Arc::clone(&accept_stop),
                        read_timeout: config.queue_read_timeout,
                        flush_frames: config.flush_frames,
                    };
                    move || run_queue_acceptor(queue_listener, ctx)
                })
                .map_err(StartError::Queue)?,
        );
        accept_threads.push(
            thread::Builder::new()
                .name("awg-direct".into())
                .spawn({
                    let hw = Arc::clone(&self.hw);
                    let stop = Arc::clone(&accept_stop);
                    let timeout = config.direct_read_timeout;
                    move || run_direct_acceptor(direct_listener, hw, stop, timeout)
                })
                .map_err(StartError::Direct)?,
        );

        log::info!(
            "Servers up: direct={}, queued={}, status={}",
            direct_addr,
            queue_addr,
            notify_addr
        );
        Ok(ServerHandle {
            hw: self.hw,
            playback,
            status,
            accept_stop,
            player_stop,
            accept_threads,
            player_thread: Some(player_thread),
            direct_addr,
            queue_addr,
            notify_addr,
            flush_frames: config.flush_frames,
        })
    }
}

fn bind(addr: IpAddr, port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddr::new(addr, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// A running server. Dropping the handle without calling
/// [`ServerHandle::shutdown`] detaches the worker threads without the PL
/// flush; call `shutdown` for an orderly stop.
pub struct ServerHandle<D: AwgDevice + Send + 'static> {
    hw: Arc<Mutex<D>>,
    playback: Arc<Playback>,
    status: Arc<StatusBoard>,
    accept_stop: Arc<AtomicBool>,
    player_stop: Arc<AtomicBool>,
    accept_threads: Vec<JoinHandle<()>>,
    player_thread: Option<JoinHandle<()>>,
    direct_addr: SocketAddr,
    queue_addr: SocketAddr,
    notify_addr: SocketAddr,
    flush_frames: u32,
}

impl<D: AwgDevice + Send + 'static> ServerHandle<D> {
    /// Bound address of the direct endpoint.
    pub fn direct_addr(&self) -> SocketAddr {
        self.direct_addr
    }

    /// Bound address of the queued endpoint.
    pub fn queue_addr(&self) -> SocketAddr {
        self.queue_addr
    }

    /// Bound address of the notification endpoint.
    pub fn notify_addr(&self) -> SocketAddr {
        self.notify_addr
    }

    /// Orderly shutdown: stop accepting, flush the PL to silence, stop the
    /// player, and leave the hardware at zero output.
    pub fn shutdown(mut self) {
        log::info!("Shutting down");
        self.accept_stop.store(true, Ordering::Release);
        for t in self.accept_threads.drain(..) {
            let _ = t.join();
        }
        log::info!("Network services stopped");

        for id in 0..NUM_LISTS {
            log::info!("Flushing PL buffer for list {}", id);
            if let Err(e) = self.playback.drain_silence(id, self.flush_frames) {
                log::error!("Failed to flush list {}: {}", id, e);
            }
        }

        self.player_stop.store(true, Ordering::Release);
        if let Some(t) = self.player_thread.take() {
            let _ = t.join();
        }
        self.status.close_subscriber();

        self.hw.lock().zero_output();
        log::info!("Server stopped");
    }
}
