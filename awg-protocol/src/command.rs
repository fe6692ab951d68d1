use std::fmt::Display;

/// Upper bound on the number of command words in a single frame.
pub const MAX_WORDS_PER_FRAME: usize = 64;

/// Upper bound on the number of frames a single preload may declare.
pub const MAX_TOTAL_FRAMES: u32 = 2_000_000;

/// Number of preload lists in the ping-pong pair.
pub const NUM_LISTS: usize = 2;

/// Externally observable state of a preload list.
///
/// A list starts out `Idle`, becomes `Loading` on a preload-begin, `Ready`
/// once fully loaded or explicitly finalized, and returns to `Idle` the
/// moment the player has consumed (and cleared) it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ListState {
    Idle,
    Loading,
    Ready,
}

impl Display for ListState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ListState::Idle => "IDLE",
            ListState::Loading => "LOADING",
            ListState::Ready => "READY",
        };
        write!(f, "{}", name)
    }
}

/// A command sent from a client to the queued playback endpoint.
///
/// Commands are processed strictly in arrival order on a single connection.
/// The protocol carries no acknowledgement bytes; the out-of-band status
/// endpoint is the only feedback channel. A malformed record drops the
/// connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Starts a preload: allocates list `list` for `total_frames` frames and
    /// marks it `Loading`. Any previous content of the list is released.
    PreloadBegin { list: u8, total_frames: u32 },
    /// Appends one frame of 1..=[`MAX_WORDS_PER_FRAME`] words to list `list`.
    /// The push that reaches `total_frames` finalizes the list to `Ready`.
    PreloadPush { list: u8, words: Box<[u32]> },
    /// Finalizes a partially loaded list (at least one frame required).
    /// A no-op on a list that is already `Ready`.
    PreloadEnd { list: u8 },
    /// Synchronously drains both lists with zero-gain frames, clears them,
    /// and reports both `Idle`. The hardware ends in a silent state before
    /// the status lines are emitted.
    Reset,
    /// A `Reset` followed by a host-level poweroff. The poweroff escalation
    /// is compiled out by default; without it the command degrades to a
    /// plain `Reset`.
    Shutdown,
}

impl Command {
    /// The single-byte wire tag of this command.
    pub fn tag(&self) -> u8 {
        match self {
            Command::PreloadBegin { .. } => b'B',
            Command::PreloadPush { .. } => b'P',
            Command::PreloadEnd { .. } => b'E',
            Command::Reset => b'Z',
            Command::Shutdown => b'X',
        }
    }
}

#[test]
fn list_state_display_matches_wire_names() {
    assert_eq!(ListState::Idle.to_string(), "IDLE");
    assert_eq!(ListState::Loading.to_string(), "LOADING");
    assert_eq!(ListState::Ready.to_string(), "READY");
}

#[test]
fn command_tags() {
    assert_eq!(
        Command::PreloadBegin {
            list: 0,
            total_frames: 1
        }
        .tag(),
        b'B'
    );
    assert_eq!(Command::Reset.tag(), b'Z');
    assert_eq!(Command::Shutdown.tag(), b'X');
}
