//! The periodic ping-pong player.
//!
//! One frame is emitted per tick from the current list. When the current list
//! runs out it is cleared and reported `Idle`, and the other list takes over
//! in the same tick, so a staged follow-up plays without a one-period gap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use awg_protocol::{ListState, MAX_WORDS_PER_FRAME, NUM_LISTS};

use crate::list::{FrameList, ListError};
use crate::notify::StatusBoard;
use crate::AwgDevice;

/// Shortest accepted tick period.
pub(crate) const MIN_PERIOD: Duration = Duration::from_micros(1);

/// State guarded by the player lock. Held only for O(1) work per tick; the
/// hardware write happens after release, from a copy of the frame.
pub(crate) struct PlaybackState {
    pub lists: [FrameList; NUM_LISTS],
    pub playing: bool,
    pub cur_list: usize,
    pub next_list: usize,
    pub cur_frame: u32,
    pub period: Duration,
}

/// The player lock plus the condvar signalled whenever playback stops.
pub(crate) struct Playback {
    pub state: Mutex<PlaybackState>,
    pub stopped: Condvar,
}

impl Playback {
    pub fn new(period: Duration) -> Playback {
        Playback {
            state: Mutex::new(PlaybackState {
                lists: [FrameList::new(), FrameList::new()],
                playing: false,
                cur_list: 0,
                next_list: 1,
                cur_frame: 0,
                period: period.max(MIN_PERIOD),
            }),
            stopped: Condvar::new(),
        }
    }

    /// Loads `frames` zero-gain frames into `list`, points the player at it,
    /// and blocks until the player has consumed the whole list. The other
    /// list is cleared first so playback cannot switch away mid-drain.
    ///
    /// Used for startup priming, the reset drain, and the shutdown flush; the
    /// player publishes the final `Idle` itself.
    pub fn drain_silence(&self, list: usize, frames: u32) -> Result<(), ListError> {
        let mut s = self.state.lock();
        s.playing = false;
        s.lists[1 - list].clear();
        if let Err(e) = s.lists[list].load_silence(frames) {
            s.lists[list].clear();
            return Err(e);
        }
        s.cur_list = list;
        s.next_list = 1 - list;
        s.cur_frame = 0;
        s.playing = true;

        // Bounded wait: a wedged player must not hang reset or shutdown.
        let deadline = Instant::now() + s.period * (frames + 2) * 4 + Duration::from_secs(1);
        while s.playing {
            if self.stopped.wait_until(&mut s, deadline).timed_out() {
                log::error!("Timed out draining list {}", list);
                s.playing = false;
                s.lists[list].clear();
                break;
            }
        }
        Ok(())
    }
}

/// Points the player at `list` and starts it, if it is not already running.
/// Callers must hold the player lock and have made `list` ready.
pub(crate) fn start_if_idle(s: &mut PlaybackState, list: usize) {
    if !s.playing {
        s.cur_list = list;
        s.next_list = 1 - list;
        s.cur_frame = 0;
        s.playing = true;
    }
}

/// Body of the player thread. Runs until `stop` is raised.
pub(crate) fn run_player<D: AwgDevice>(
    playback: Arc<Playback>,
    status: Arc<StatusBoard>,
    hw: Arc<Mutex<D>>,
    stop: Arc<AtomicBool>,
) {
    elevate_priority();
    let mut frame_buf = [0u32; MAX_WORDS_PER_FRAME];
    let mut deadline = Instant::now();
    while !stop.load(Ordering::Acquire) {
        // Absolute deadline: scheduling jitter does not accumulate, and a
        // late tick is followed by back-to-back ticks until caught up.
        deadline += playback.state.lock().period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        tick(&playback, &status, &hw, &mut frame_buf);
    }
    log::debug!("Player thread exiting");
}

fn tick<D: AwgDevice>(
    playback: &Playback,
    status: &StatusBoard,
    hw: &Mutex<D>,
    frame_buf: &mut [u32; MAX_WORDS_PER_FRAME],
) {
    loop {
        let mut s = playback.state.lock();
        if !s.playing {
            return;
        }
        let cur = s.cur_list;
        let exhausted =
            s.lists[cur].state() != ListState::Ready || s.cur_frame >= s.lists[cur].total_frames();
        if exhausted {
            let finished = cur;
            let next = s.next_list;
            if s.lists[next].state() == ListState::Ready && s.lists[next].total_frames() > 0 {
                log::debug!("Switching from list {} to {}", finished, next);
                s.cur_list = next;
                s.next_list = finished;
                s.cur_frame = 0;
            } else {
                log::debug!("End of list {}, no next ready, stopping", finished);
                s.playing = false;
            }
            s.lists[finished].clear();
            playback.stopped.notify_all();
            drop(s);
            status.publish(finished as u8, ListState::Idle);
            // The switch is this tick's action: emit the first frame of the
            // new list now rather than after another period.
            continue;
        }

        let frame = s.lists[cur]
            .frame(s.cur_frame)
            .expect("ready list holds all frames below its total");
        let len = frame.len();
        frame_buf[..len].copy_from_slice(frame);
        s.cur_frame += 1;
        drop(s);
        hw.lock().send_words(&frame_buf[..len]);
        return;
    }
}

/// Requests SCHED_FIFO near the top of the allowed range. Denial is expected
/// for unprivileged runs and only logged.
fn elevate_priority() {
    use nix::libc;

    // SAFETY: plain libc calls on the calling thread with a valid parameter
    // struct; no memory is shared with the kernel beyond the call.
    unsafe {
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max < 0 {
            log::warn!("Could not query SCHED_FIFO priority range");
            return;
        }
        let param = libc::sched_param {
            sched_priority: max - 1,
        };
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) == 0 {
            log::info!("Player running at SCHED_FIFO priority {}", max - 1);
        } else {
            log::warn!("Real-time priority unavailable, continuing at normal priority");
        }
    }
}
