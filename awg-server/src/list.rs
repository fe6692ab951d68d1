//! Preload frame lists.
//!
//! A [`FrameList`] stores one staged playback sequence as a flattened word
//! buffer plus per-frame offset/count metadata, giving the player O(1) access
//! to any frame without copying. Lists are always accessed under the player
//! lock; this module contains no synchronization of its own.

use awg_protocol::{word, ListState, MAX_TOTAL_FRAMES, MAX_WORDS_PER_FRAME};

/// Granularity, in words, of the flattened word buffer growth.
const GROW_WORDS_STEP: usize = 4096;

/// Errors returned by list mutations.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// A caller-supplied value is out of range for the current list state.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The list already holds its declared number of frames.
    #[error("list already holds its declared frame total")]
    Overfull,
    /// The allocator refused to grow a preload buffer.
    #[error("out of memory while growing a preload buffer")]
    OutOfMemory,
}

/// One preload buffer of the ping-pong pair.
///
/// Frames are appended during a preload and consumed in order by the player.
/// The externally observable lifecycle is `Idle -> Loading -> Ready -> Idle`;
/// clearing releases all storage so an idle list costs nothing.
#[derive(Debug)]
pub struct FrameList {
    offsets: Vec<u32>,
    counts: Vec<u16>,
    words: Vec<u32>,
    total_frames: u32,
    state: ListState,
}

impl Default for FrameList {
    fn default() -> Self {
        FrameList::new()
    }
}

impl FrameList {
    pub fn new() -> FrameList {
        FrameList {
            offsets: Vec::new(),
            counts: Vec::new(),
            words: Vec::new(),
            total_frames: 0,
            state: ListState::Idle,
        }
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    /// Number of frames this preload declared up front.
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Number of frames pushed so far.
    pub fn loaded_frames(&self) -> u32 {
        self.counts.len() as u32
    }

    /// Words currently stored across all loaded frames.
    pub fn words_used(&self) -> usize {
        self.words.len()
    }

    /// Starts a new preload of `total_frames` frames, releasing any previous
    /// content. The list is `Loading` afterwards.
    pub fn prepare(&mut self, total_frames: u32) -> Result<(), ListError> {
        if total_frames == 0 || total_frames > MAX_TOTAL_FRAMES {
            return Err(ListError::InvalidArgument("frame total out of range"));
        }
        self.clear();
        self.offsets
            .try_reserve_exact(total_frames as usize)
            .map_err(|_| ListError::OutOfMemory)?;
        self.counts
            .try_reserve_exact(total_frames as usize)
            .map_err(|_| ListError::OutOfMemory)?;
        self.total_frames = total_frames;
        self.state = ListState::Loading;
        Ok(())
    }

    fn reserve_words(&mut self, extra: usize) -> Result<(), ListError> {
        let need = self.words.len() + extra;
        if need <= self.words.capacity() {
            return Ok(());
        }
        let mut cap = self.words.capacity().max(GROW_WORDS_STEP);
        while cap < need {
            cap += GROW_WORDS_STEP;
        }
        self.words
            .try_reserve_exact(cap - self.words.len())
            .map_err(|_| ListError::OutOfMemory)
    }

    /// Appends one frame of 1..=[`MAX_WORDS_PER_FRAME`] words.
    pub fn push(&mut self, frame: &[u32]) -> Result<(), ListError> {
        if self.state != ListState::Loading {
            return Err(ListError::InvalidArgument("list is not loading"));
        }
        if frame.is_empty() || frame.len() > MAX_WORDS_PER_FRAME {
            return Err(ListError::InvalidArgument("frame word count out of range"));
        }
        if self.loaded_frames() == self.total_frames {
            return Err(ListError::Overfull);
        }
        self.reserve_words(frame.len())?;
        let offset = self.words.len() as u32;
        self.words.extend_from_slice(frame);
        self.offsets.push(offset);
        self.counts.push(frame.len() as u16);
        Ok(())
    }

    /// Marks the list `Ready`. Requires at least one loaded frame; truncates
    /// the declared total down to what was actually loaded. Finalizing an
    /// already-ready list is a no-op.
    pub fn finalize(&mut self) -> Result<(), ListError> {
        if self.state == ListState::Ready {
            return Ok(());
        }
        if self.loaded_frames() == 0 {
            return Err(ListError::InvalidArgument("no frames loaded"));
        }
        self.total_frames = self.loaded_frames();
        self.state = ListState::Ready;
        Ok(())
    }

    /// Releases all storage and returns the list to `Idle`.
    pub fn clear(&mut self) {
        *self = FrameList::new();
    }

    /// Borrows the word slice of frame `index`, if loaded.
    pub fn frame(&self, index: u32) -> Option<&[u32]> {
        let i = index as usize;
        let offset = *self.offsets.get(i)? as usize;
        let count = *self.counts.get(i)? as usize;
        self.words.get(offset..offset + count)
    }

    /// Fills the list with `frames` copies of the zero-gain frame and marks
    /// it ready. Used for PL priming and drains; emits no status transitions.
    pub fn load_silence(&mut self, frames: u32) -> Result<(), ListError> {
        self.prepare(frames)?;
        let silence = word::zero_gain_frame();
        for _ in 0..frames {
            self.push(&silence)?;
        }
        self.finalize()
    }
}
