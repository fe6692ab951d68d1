//! # AWG Control Server for Zynq AXI GPIO
//!
//! Linux launcher wiring a hardware backend to the playback core. Two
//! backends are provided: a `/dev/mem` mapping of the AXI GPIO blocks at
//! their fixed physical addresses, and a UIO device node for setups where
//! the windows are exported through the UIO subsystem.
mod backends;

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use awg_server::{AwgDevice, AwgServer, Config};

use crate::backends::devmem::{DevMemBackend, DEFAULT_MEM_PATH};
use crate::backends::gpio::WenConfig;
use crate::backends::uio::{uio_device_path, UioBackend};

#[derive(Subcommand, Eq, PartialEq, Clone)]
enum DeviceImpl {
    /// Map the AXI GPIO windows from a physical-memory device node
    DevMem {
        /// Memory device node (defaults to /dev/mem)
        path: Option<PathBuf>,
    },
    /// Map the AXI GPIO windows from a UIO device node
    Uio {
        /// UIO device node (auto-detected by name when omitted)
        path: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(about = "Real-time control server for an FPGA arbitrary-waveform generator", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(
        long,
        default_value = "9000",
        help = "Port of the direct passthrough endpoint"
    )]
    direct_port: u16,

    #[arg(
        long,
        default_value = "9100",
        help = "Port of the queued playback endpoint"
    )]
    queue_port: u16,

    #[arg(
        long,
        default_value = "9101",
        help = "Port of the status notification endpoint"
    )]
    notify_port: u16,

    #[arg(long, default_value = "1000", help = "Player tick period in microseconds")]
    period_us: u64,

    #[arg(
        long,
        default_value = "100",
        help = "Zero-gain frames used to prime and flush the PL"
    )]
    flush_frames: u32,

    #[arg(long, help = "Treat the write-enable strobe as active-low")]
    wen_active_low: bool,

    #[arg(
        long,
        default_value = "0",
        help = "WEN pulse dwell time in microseconds (0 = edge only)"
    )]
    wen_pulse_us: u64,

    #[clap(subcommand)]
    device: Option<DeviceImpl>,
}

// Signal-handler bridge; the handler may only do an atomic store.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: i32) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to a static atomic.
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

fn run<D: AwgDevice + Send + 'static>(device: D, config: Config) -> i32 {
    let handle = match AwgServer::new(device, config).start() {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            return e.exit_code();
        }
    };

    if let Err(e) = install_signal_handlers() {
        log::error!("Failed to install signal handlers: {}", e);
        handle.shutdown();
        return 1;
    }

    while !STOP.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    log::info!("Stop signal received");
    handle.shutdown();
    0
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting AWG control server");

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: ip={}, direct={}, queued={}, status={}",
        args.ip,
        args.direct_port,
        args.queue_port,
        args.notify_port
    );

    let wen = WenConfig {
        active_low: args.wen_active_low,
        pulse: Duration::from_micros(args.wen_pulse_us),
    };
    let config = Config {
        bind_addr: args.ip,
        direct_port: args.direct_port,
        queue_port: args.queue_port,
        notify_port: args.notify_port,
        period: Duration::from_micros(args.period_us.max(1)),
        flush_frames: args.flush_frames,
        ..Config::default()
    };

    let device_impl = args.device.unwrap_or_else(|| {
        if let Some(path) = uio_device_path() {
            log::info!("Auto-detected UIO device at {}", path.display());
            DeviceImpl::Uio { path: Some(path) }
        } else {
            log::info!("No UIO device found, falling back to {}", DEFAULT_MEM_PATH);
            DeviceImpl::DevMem { path: None }
        }
    });

    let code = match device_impl {
        DeviceImpl::DevMem { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_MEM_PATH));
            log::info!("Initializing /dev/mem backend from {}", path.display());
            match DevMemBackend::new(&path, wen) {
                Ok(device) => run(device, config),
                Err(e) => {
                    log::error!("Hardware unavailable ({}): {}", path.display(), e);
                    1
                }
            }
        }
        DeviceImpl::Uio { path } => {
            let path = match path.or_else(uio_device_path) {
                Some(path) => path,
                None => {
                    log::error!(
                        "No AWG UIO device could be detected; specify one with `uio <path>`"
                    );
                    process::exit(1);
                }
            };
            log::info!("Initializing UIO backend from {}", path.display());
            match UioBackend::new(&path, wen) {
                Ok(device) => run(device, config),
                Err(e) => {
                    log::error!("Hardware unavailable ({}): {}", path.display(), e);
                    1
                }
            }
        }
    };
    process::exit(code);
}
