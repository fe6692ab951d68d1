//! End-to-end scenarios against a running server and a recording device.
//!
//! Each test starts its own server on ephemeral ports with a short tick
//! period and a small flush count so drains complete quickly. Assertions on
//! emitted words always skip the frames produced by startup priming.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use awg_client::{DirectClient, QueueClient, StatusClient};
use awg_protocol::{word, ListState};
use awg_server::{AwgDevice, Builder, ServerHandle};

struct RecordingDevice {
    frames: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl AwgDevice for RecordingDevice {
    fn send_words(&mut self, words: &[u32]) {
        self.frames.lock().push(words.to_vec());
    }
}

struct Rig {
    handle: Option<ServerHandle<RecordingDevice>>,
    frames: Arc<Mutex<Vec<Vec<u32>>>>,
    baseline: usize,
}

const TICK: Duration = Duration::from_millis(20);
const FLUSH_FRAMES: u32 = 3;
const WAIT: Duration = Duration::from_secs(10);

impl Rig {
    fn start() -> Rig {
        Rig::start_with_period(TICK)
    }

    fn start_with_period(period: Duration) -> Rig {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let device = RecordingDevice {
            frames: Arc::clone(&frames),
        };
        let handle = Builder::new()
            .bind_addr(Ipv4Addr::LOCALHOST.into())
            .direct_port(0)
            .queue_port(0)
            .notify_port(0)
            .period(period)
            .flush_frames(FLUSH_FRAMES)
            .start(device)
            .expect("server should start on ephemeral ports");
        let baseline = frames.lock().len();
        Rig {
            handle: Some(handle),
            frames,
            baseline,
        }
    }

    fn handle(&self) -> &ServerHandle<RecordingDevice> {
        self.handle.as_ref().unwrap()
    }

    fn queue(&self) -> QueueClient {
        QueueClient::connect(self.handle().queue_addr()).unwrap()
    }

    fn status(&self) -> StatusClient {
        let client = StatusClient::connect(self.handle().notify_addr()).unwrap();
        client.set_read_timeout(Some(WAIT)).unwrap();
        client
    }

    /// Frames emitted since startup priming finished.
    fn emitted(&self) -> Vec<Vec<u32>> {
        self.frames.lock()[self.baseline..].to_vec()
    }

    fn wait_until(&self, mut cond: impl FnMut(&[Vec<u32>]) -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cond(&self.emitted()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}

fn expect_status(status: &mut StatusClient, expected: &[(u8, ListState)]) {
    for &(list, state) in expected {
        let got = status.next_status().expect("status line should arrive");
        assert_eq!(got, (list, state));
    }
}

#[test]
fn priming_emits_zero_gain_frames_before_startup_completes() {
    let rig = Rig::start();
    let primed = rig.frames.lock().clone();
    assert_eq!(primed.len(), 2 * FLUSH_FRAMES as usize);
    for frame in &primed {
        assert_eq!(frame.as_slice(), &word::zero_gain_frame()[..]);
    }
}

#[test]
fn single_list_playback() {
    let rig = Rig::start();
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    let mut queue = rig.queue();
    queue.preload_begin(0, 3).unwrap();
    for w in [0xABCD_0001u32, 0xABCD_0002, 0xABCD_0003] {
        queue.preload_push(0, &[w]).unwrap();
    }

    expect_status(
        &mut status,
        &[
            (0, ListState::Loading),
            (0, ListState::Ready),
            (0, ListState::Idle),
        ],
    );

    assert_eq!(
        rig.emitted(),
        vec![vec![0xABCD_0001], vec![0xABCD_0002], vec![0xABCD_0003]]
    );
}

#[test]
fn ping_pong_switch_plays_both_lists_contiguously() {
    // Wide ticks so staging list 1 comfortably beats the end of list 0.
    let rig = Rig::start_with_period(Duration::from_millis(50));
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    let mut queue = rig.queue();
    queue
        .load_list(0, &[&[0xB1u32][..], &[0xB2u32][..]])
        .unwrap();
    queue
        .load_list(1, &[&[0xC1u32][..], &[0xC2u32][..]])
        .unwrap();

    expect_status(
        &mut status,
        &[
            (0, ListState::Loading),
            (0, ListState::Ready),
            (1, ListState::Loading),
            (1, ListState::Ready),
            (0, ListState::Idle),
            (1, ListState::Idle),
        ],
    );

    assert_eq!(
        rig.emitted(),
        vec![vec![0xB1], vec![0xB2], vec![0xC1], vec![0xC2]]
    );
}

#[test]
fn client_disconnect_cancels_preload() {
    let rig = Rig::start();
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    {
        let mut queue = rig.queue();
        queue.preload_begin(0, 10).unwrap();
        for w in [1u32, 2, 3] {
            queue.preload_push(0, &[w]).unwrap();
        }
        // Dropped here: the connection closes with the preload unfinished.
    }

    expect_status(
        &mut status,
        &[(0, ListState::Loading), (0, ListState::Idle)],
    );
    assert!(rig.emitted().is_empty());
}

#[test]
fn overlength_push_drops_connection_without_emitting() {
    let rig = Rig::start();
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    let mut raw = TcpStream::connect(rig.handle().queue_addr()).unwrap();
    raw.set_read_timeout(Some(WAIT)).unwrap();
    raw.write_all(b"B\x01\x00\x00\x00\x01").unwrap();
    // 65-word push header: rejected before any payload is read.
    raw.write_all(b"P\x01\x00\x41").unwrap();

    expect_status(
        &mut status,
        &[(1, ListState::Loading), (1, ListState::Idle)],
    );

    // The server closes its end after the protocol violation.
    let mut buf = [0u8; 1];
    match raw.read(&mut buf) {
        Ok(0) | Err(_) => {}
        Ok(_) => panic!("server sent unexpected bytes on the queued channel"),
    }
    assert!(rig.emitted().is_empty());
}

#[test]
fn subscriber_reconnect_sees_current_state() {
    let rig = Rig::start();
    {
        let mut status = rig.status();
        expect_status(
            &mut status,
            &[(0, ListState::Idle), (1, ListState::Idle)],
        );
        let mut queue = rig.queue();
        queue.preload_begin(0, 1).unwrap();
        queue.preload_push(0, &[0x42]).unwrap();
        expect_status(
            &mut status,
            &[
                (0, ListState::Loading),
                (0, ListState::Ready),
                (0, ListState::Idle),
            ],
        );
    }

    // A fresh subscriber (replacing the old one) gets the current states.
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );
}

#[test]
fn preload_end_after_full_load_is_harmless() {
    // Long ticks keep the list ready while the extra end record arrives.
    let rig = Rig::start_with_period(Duration::from_millis(50));
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    let mut queue = rig.queue();
    queue.preload_begin(0, 2).unwrap();
    queue.preload_push(0, &[0xD1]).unwrap();
    queue.preload_push(0, &[0xD2]).unwrap();
    queue.preload_end(0).unwrap();

    expect_status(
        &mut status,
        &[
            (0, ListState::Loading),
            (0, ListState::Ready),
            (0, ListState::Idle),
        ],
    );

    // The connection survived: a second load on the same socket still works.
    queue.preload_begin(1, 1).unwrap();
    queue.preload_push(1, &[0xD3]).unwrap();
    expect_status(
        &mut status,
        &[
            (1, ListState::Loading),
            (1, ListState::Ready),
            (1, ListState::Idle),
        ],
    );

    assert_eq!(rig.emitted(), vec![vec![0xD1], vec![0xD2], vec![0xD3]]);
}

#[test]
fn reset_drains_to_silence_and_clears_both_lists() {
    let rig = Rig::start();
    let mut status = rig.status();
    expect_status(
        &mut status,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );

    let mut queue = rig.queue();
    let noise = [0xFFFF_FFFFu32, 0xFFFF_FFFF];
    let frames: Vec<&[u32]> = (0..50).map(|_| &noise[..]).collect();
    queue.load_list(0, &frames).unwrap();
    expect_status(
        &mut status,
        &[(0, ListState::Loading), (0, ListState::Ready)],
    );

    // Wait for playback to actually start, then pull the rug.
    assert!(rig.wait_until(|emitted| !emitted.is_empty()));
    queue.reset().unwrap();

    expect_status(&mut status, &[(0, ListState::Idle)]);

    // Both drains finished: the tail is zero-gain frames, one per flush
    // frame, and nothing follows them.
    let zero = word::zero_gain_frame().to_vec();
    assert!(rig.wait_until(|emitted| {
        emitted.len() >= 2 * FLUSH_FRAMES as usize
            && emitted[emitted.len() - 2 * FLUSH_FRAMES as usize..]
                .iter()
                .all(|f| *f == zero)
    }));

    // A fresh subscriber confirms both lists ended up idle.
    let mut fresh = rig.status();
    expect_status(
        &mut fresh,
        &[(0, ListState::Idle), (1, ListState::Idle)],
    );
}

#[test]
fn direct_frames_bypass_the_queue() {
    let rig = Rig::start();
    let mut direct = DirectClient::connect(rig.handle().direct_addr()).unwrap();
    direct.send_frame(&[0xE1, 0xE2]).unwrap();
    direct.send_frame(&[0xE3]).unwrap();

    assert!(rig.wait_until(|emitted| emitted.len() == 2));
    assert_eq!(rig.emitted(), vec![vec![0xE1, 0xE2], vec![0xE3]]);
}

#[test]
fn shutdown_flushes_and_silences_the_hardware() {
    let rig = Rig::start();
    let mut queue = rig.queue();
    queue.preload_begin(0, 1).unwrap();
    queue.preload_push(0, &[0x7777]).unwrap();
    assert!(rig.wait_until(|emitted| emitted.len() == 1));

    let frames = Arc::clone(&rig.frames);
    drop(rig); // shutdown: flush both lists, then one final zero_output

    let all = frames.lock().clone();
    let zero = word::zero_gain_frame().to_vec();
    assert_eq!(all.last(), Some(&zero));
    let tail = &all[all.len() - (2 * FLUSH_FRAMES as usize + 1)..];
    assert!(tail.iter().all(|f| *f == zero));
}
