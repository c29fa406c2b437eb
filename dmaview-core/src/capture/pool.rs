//! Fixed-capacity capture buffer pool
//!
//! Buffers are addressed by their V4L2 index, which doubles as the slot in
//! the pool. The pool never grows past [`POOL_SIZE`].

use crate::error::{DmaviewError, Result};
use crate::types::POOL_SIZE;

use super::PlaneInfo;

/// Lifecycle of a capture buffer
///
/// `Exported` buffers sit in the device queue waiting to be filled; the
/// device owns their memory until they come back as `Filled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferState {
    /// Allocated, not yet queried or queued
    #[default]
    Free,
    /// Queued to the device, handles not yet exported
    Queued,
    /// Handles exported, waiting in the device queue
    Exported,
    /// Dequeued with a complete frame
    Filled,
    /// Attached to the surface
    Displayed,
    /// Handed back by STREAMOFF without a frame
    Dequeued,
}

impl BufferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Queued => "queued",
            Self::Exported => "exported",
            Self::Filled => "filled",
            Self::Displayed => "displayed",
            Self::Dequeued => "dequeued",
        }
    }

    /// Whether `self -> next` is a legal step
    ///
    /// Requeueing a filled, displayed or dequeued buffer returns it to
    /// `Exported`.
    pub fn can_become(&self, next: BufferState) -> bool {
        use BufferState::*;
        matches!(
            (self, next),
            (Free, Queued)
                | (Queued, Exported)
                | (Exported, Filled)
                | (Filled, Displayed)
                | (Filled, Exported)
                | (Displayed, Exported)
                | (Exported, Dequeued)
                | (Dequeued, Exported)
                | (_, Free)
        )
    }
}

impl std::fmt::Display for BufferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot of the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureBuffer {
    index: u32,
    planes: Vec<PlaneInfo>,
    state: BufferState,
}

impl CaptureBuffer {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn planes(&self) -> &[PlaneInfo] {
        &self.planes
    }

    pub fn state(&self) -> BufferState {
        self.state
    }
}

/// The capture pool
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: [CaptureBuffer; POOL_SIZE],
    len: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the first `count` slots live, all `Free`
    pub fn reset(&mut self, count: usize) -> Result<()> {
        if count > POOL_SIZE {
            return Err(DmaviewError::config(format!(
                "buffer pool holds at most {} buffers, {} requested",
                POOL_SIZE, count
            )));
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            *slot = CaptureBuffer {
                index: index as u32,
                ..CaptureBuffer::default()
            };
        }
        self.len = count;
        Ok(())
    }

    /// Drop every slot back to empty
    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: u32) -> Option<&CaptureBuffer> {
        self.slots[..self.len].get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureBuffer> {
        self.slots[..self.len].iter()
    }

    /// Record plane locations reported by the device
    pub fn set_planes(&mut self, index: u32, planes: Vec<PlaneInfo>) -> Result<()> {
        let slot = self.slot_mut(index)?;
        slot.planes = planes;
        Ok(())
    }

    /// Move a buffer to `next`, refusing illegal steps
    pub fn transition(&mut self, index: u32, next: BufferState) -> Result<()> {
        let slot = self.slot_mut(index)?;
        if !slot.state.can_become(next) {
            return Err(DmaviewError::InvalidTransition {
                index,
                from: slot.state.as_str(),
                to: next.as_str(),
            });
        }
        slot.state = next;
        Ok(())
    }

    /// Number of buffers currently in `state`
    pub fn count_in(&self, state: BufferState) -> usize {
        self.iter().filter(|b| b.state == state).count()
    }

    fn slot_mut(&mut self, index: u32) -> Result<&mut CaptureBuffer> {
        let len = self.len;
        self.slots[..len].get_mut(index as usize).ok_or_else(|| {
            DmaviewError::config(format!("buffer index {} outside pool of {}", index, len))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_bounds() {
        let mut pool = BufferPool::new();
        assert!(pool.reset(POOL_SIZE).is_ok());
        assert_eq!(pool.len(), POOL_SIZE);
        assert!(pool.reset(POOL_SIZE + 1).is_err());
    }

    #[test]
    fn test_indices_match_slots() {
        let mut pool = BufferPool::new();
        pool.reset(3).unwrap();
        let indices: Vec<u32> = pool.iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(pool.get(3).is_none());
    }

    #[test]
    fn test_lifecycle() {
        let mut pool = BufferPool::new();
        pool.reset(1).unwrap();

        for next in [
            BufferState::Queued,
            BufferState::Exported,
            BufferState::Filled,
            BufferState::Displayed,
            BufferState::Exported,
        ] {
            pool.transition(0, next).unwrap();
        }
        assert_eq!(pool.get(0).unwrap().state(), BufferState::Exported);
    }

    #[test]
    fn test_stream_stop_round_trip() {
        let mut pool = BufferPool::new();
        pool.reset(1).unwrap();
        pool.transition(0, BufferState::Queued).unwrap();
        pool.transition(0, BufferState::Exported).unwrap();

        pool.transition(0, BufferState::Dequeued).unwrap();
        assert!(!BufferState::Dequeued.can_become(BufferState::Filled));
        pool.transition(0, BufferState::Exported).unwrap();
        assert_eq!(pool.get(0).unwrap().state(), BufferState::Exported);
    }

    #[test]
    fn test_illegal_transition() {
        let mut pool = BufferPool::new();
        pool.reset(1).unwrap();

        let err = pool.transition(0, BufferState::Displayed).unwrap_err();
        assert!(matches!(err, DmaviewError::InvalidTransition { index: 0, .. }));
        assert_eq!(pool.get(0).unwrap().state(), BufferState::Free);
    }

    #[test]
    fn test_count_in() {
        let mut pool = BufferPool::new();
        pool.reset(2).unwrap();
        pool.transition(1, BufferState::Queued).unwrap();
        assert_eq!(pool.count_in(BufferState::Free), 1);
        assert_eq!(pool.count_in(BufferState::Queued), 1);
    }
}
