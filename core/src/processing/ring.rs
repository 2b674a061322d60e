use crate::capture::MessageRecord;
use crate::prelude::{Address, PipelineError, PipelineResult, SequenceNumber};
use std::collections::HashMap;

type MessageKey = (Address, SequenceNumber);

/// Fixed-capacity slot set holding the live records of the correlation
/// window, with an `(addr, seq)` index over the occupied slots.
pub struct RingSlots {
    slots: Vec<Option<MessageRecord>>,
    index: HashMap<MessageKey, Vec<usize>>,
}

impl RingSlots {
    pub fn with_capacity(capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::Configuration(
                "ring capacity must be positive".into(),
            ));
        }
        Ok(Self {
            slots: vec![None; capacity],
            index: HashMap::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_live(&self, position: usize) -> bool {
        self.slots[position % self.capacity()].is_some()
    }

    pub fn get(&self, position: usize) -> Option<&MessageRecord> {
        self.slots[position % self.capacity()].as_ref()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Stores `record` at `position`, returning whatever record it displaced.
    pub fn insert(&mut self, position: usize, record: MessageRecord) -> Option<MessageRecord> {
        let position = position % self.capacity();
        let displaced = self.take(position);
        self.index
            .entry((record.src_addr, record.seq))
            .or_default()
            .push(position);
        self.slots[position] = Some(record);
        displaced
    }

    /// Empties `position`, leaving the null record behind.
    pub fn take(&mut self, position: usize) -> Option<MessageRecord> {
        let position = position % self.capacity();
        let record = self.slots[position].take()?;
        let key = (record.src_addr, record.seq);
        if let Some(positions) = self.index.get_mut(&key) {
            positions.retain(|&p| p != position);
            if positions.is_empty() {
                self.index.remove(&key);
            }
        }
        Some(record)
    }

    /// Slots currently holding a record for `(addr, seq)`, in insertion order.
    pub fn lookup(&self, addr: Address, seq: SequenceNumber) -> Vec<usize> {
        self.index.get(&(addr, seq)).cloned().unwrap_or_default()
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut MessageRecord> {
        let capacity = self.capacity();
        self.slots[position % capacity].as_mut()
    }

    /// Live records in slot order starting at `start`, wrapping once.
    pub fn drain_from(&mut self, start: usize) -> Vec<MessageRecord> {
        let capacity = self.capacity();
        (0..capacity)
            .filter_map(|offset| self.take(start + offset))
            .collect()
    }
}
