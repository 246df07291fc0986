//! Fixed-capacity pool of live decoders.
//!
//! Slots are reused by proximity: a decoder already positioned at or before
//! the requested frame can decode forward without any seek, which is both
//! cheaper and safer than seeking. When no slot fits, an empty one is filled,
//! or the least-recently-used slot is torn down and replaced. Every access
//! bumps a per-pool monotonic sequence number used for LRU ordering.

use crate::backend::{BackendFactory, DecodeBackend};
use crate::error::Result;

struct DecoderSlot {
    backend: Option<Box<dyn DecodeBackend>>,
    last_use: u64,
}

pub struct DecoderPool {
    slots: Vec<DecoderSlot>,
    sequence: u64,
}

impl DecoderPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(DecoderSlot {
                backend: None,
                last_use: 0,
            });
        }
        Self { slots, sequence: 0 }
    }

    /// Put a decoder into slot 0. Used for the decoder that probed the track
    /// at open time, so its position near the stream start stays reusable.
    pub fn install(&mut self, backend: Box<dyn DecodeBackend>) {
        self.slots[0].backend = Some(backend);
        self.touch(0);
    }

    pub fn backend_mut(&mut self, idx: usize) -> Option<&mut Box<dyn DecodeBackend>> {
        self.slots.get_mut(idx)?.backend.as_mut()
    }

    /// Whether any decoder currently sits in `[low, high]`, making a linear
    /// decode preferable to seeking.
    pub fn has_decoder_in_range(&self, low: i64, high: i64) -> bool {
        self.slots.iter().any(|slot| {
            slot.backend.as_ref().is_some_and(|b| {
                let n = b.current_frame_number();
                n >= low && n <= high
            })
        })
    }

    /// Grab a slot to seek with. The decoder's current position is irrelevant
    /// (it is about to seek away), so any existing decoder in the chosen slot
    /// is reused as-is.
    pub fn acquire_for_seek(&mut self, factory: &dyn BackendFactory) -> Result<usize> {
        let idx = self.empty_slot().unwrap_or_else(|| self.lru_slot());
        if self.slots[idx].backend.is_none() {
            self.slots[idx].backend = Some(factory.open()?);
        }
        self.touch(idx);
        Ok(idx)
    }

    /// Grab a slot to decode linearly toward frame `n`.
    ///
    /// Preference order: the occupied slot closest below `n` (skipping
    /// ever-seeked decoders when `force_unseeked`), else an empty slot, else
    /// the LRU slot; the latter two always get a fresh decoder.
    pub fn acquire_for_linear(
        &mut self,
        n: i64,
        force_unseeked: bool,
        factory: &dyn BackendFactory,
    ) -> Result<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(backend) = slot.backend.as_ref() else {
                continue;
            };
            if force_unseeked && backend.has_seeked() {
                continue;
            }
            let current = backend.current_frame_number();
            if current <= n && best.map_or(true, |(_, c)| c < current) {
                best = Some((i, current));
            }
        }

        let idx = match best {
            Some((i, _)) => i,
            None => {
                let i = self.empty_slot().unwrap_or_else(|| self.lru_slot());
                self.slots[i].backend = Some(factory.open()?);
                i
            }
        };

        self.touch(idx);
        Ok(idx)
    }

    pub fn drop_slot(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.backend = None;
        }
    }

    /// Tear down every decoder. Used when latching linear mode.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.backend = None;
        }
    }

    fn empty_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.backend.is_none())
    }

    fn lru_slot(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.backend.is_some())
            .min_by_key(|(_, s)| s.last_use)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn touch(&mut self, idx: usize) {
        self.sequence += 1;
        self.slots[idx].last_use = self.sequence;
    }
}
