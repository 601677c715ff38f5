use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing in flight, the CPU has not touched the slot since its last use
    Idle,
    /// The CPU is writing the slot's buffers and recording commands
    Recording,
    /// Handed to the GPU, reusable once the fence reaches the watermark
    Submitted,
}

#[derive(Debug)]
pub struct FrameSlot<T> {
    pub resources: T,
    /// Fence value the GPU must reach before the slot may be reused
    pub watermark: u64,
    pub state: SlotState,
}

impl<T> FrameSlot<T> {
    fn new(resources: T) -> Self {
        FrameSlot {
            resources,
            watermark: 0,
            state: SlotState::Idle,
        }
    }
}

/// Fixed size ring of per-frame state. The cursor only ever moves forward by one slot.
#[derive(Debug)]
pub struct FrameRing<T> {
    current_frame: usize,
    slots: Vec<FrameSlot<T>>,
}

impl<T> FrameRing<T> {
    pub fn new(init_data: Vec<T>) -> Result<Self> {
        if init_data.is_empty() {
            return Err(Error::EmptyRing);
        }

        let mut slots: Vec<_> = init_data.into_iter().map(FrameSlot::new).collect();
        slots[0].state = SlotState::Recording;

        Ok(FrameRing {
            current_frame: 0,
            slots,
        })
    }

    pub fn from_fn(frame_count: usize, init_fn: impl FnMut(usize) -> T) -> Result<Self> {
        Self::new((0..frame_count).map(init_fn).collect())
    }

    pub fn try_from_fn<E>(
        frame_count: usize,
        init_fn: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E>
    where
        E: From<Error>,
    {
        let init_data = (0..frame_count).map(init_fn).collect::<Result<_, _>>()?;
        Ok(Self::new(init_data)?)
    }
}

impl<T> FrameRing<T> {
    /// Moves the cursor to the next slot and returns its index
    pub fn advance(&mut self) -> usize {
        self.current_frame = (self.current_frame + 1) % self.slots.len();
        self.current_frame
    }

    pub fn current_index(&self) -> usize {
        self.current_frame
    }

    pub fn current(&self) -> &FrameSlot<T> {
        &self.slots[self.current_frame]
    }

    pub fn current_mut(&mut self) -> &mut FrameSlot<T> {
        &mut self.slots[self.current_frame]
    }

    pub fn get(&self, index: usize) -> Option<&FrameSlot<T>> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot<T>> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot<T>> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_is_rejected() {
        assert!(matches!(FrameRing::<()>::new(vec![]), Err(Error::EmptyRing)));
    }

    #[test]
    fn first_slot_starts_recording() {
        let ring = FrameRing::from_fn(3, |index| index).unwrap();
        assert_eq!(ring.current_index(), 0);
        assert_eq!(ring.current().state, SlotState::Recording);
        assert!(ring.iter().skip(1).all(|slot| slot.state == SlotState::Idle));
        assert!(ring.iter().all(|slot| slot.watermark == 0));
    }

    #[test]
    fn cursor_wraps_without_skipping() {
        let mut ring = FrameRing::from_fn(3, |index| index).unwrap();
        let visited: Vec<_> = (0..6).map(|_| ring.advance()).collect();
        assert_eq!(visited, [1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.current().resources, 0);
    }

    #[test]
    fn single_slot_ring_stays_put() {
        let mut ring = FrameRing::new(vec!["only"]).unwrap();
        assert_eq!(ring.advance(), 0);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn try_from_fn_propagates_errors() {
        let result = FrameRing::try_from_fn(3, |index| {
            if index == 2 {
                Err(Error::IndexOutOfRange { index, count: 2 })
            } else {
                Ok(index)
            }
        });
        assert!(matches!(result, Err(Error::IndexOutOfRange { index: 2, .. })));
    }
}
