//! Lock-free single-producer / single-consumer queue shared between the
//! two cores.
//!
//! Each slot carries one atomic tag holding its state and the sequence
//! number of the message in it:
//!
//! ```text
//!   31                             2 1   0
//!   ┌───────────────────────────────┬─────┐
//!   │ sequence (30 bits, wrapping)  │state│   FREE / WRITING / READY / READING
//!   └───────────────────────────────┴─────┘
//! ```
//!
//! The producer fills a slot it owns (`FREE` → `WRITING`), publishes it
//! with a release store of `READY` and then advances the shared `head`
//! sequence. The consumer reads `head` first, so every message older than
//! it is visible in the following scan, and claims the oldest `READY` slot
//! with an acquire CAS (`READY` → `READING`). It moves the value out and
//! releases the slot back to `FREE`. Tags are the only synchronisation
//! points, so neither side can observe a half-written message.
//!
//! When full, the producer may evict the oldest unread message by winning
//! the same CAS (`READY` → `WRITING`) the consumer uses; whoever loses
//! rescans.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const FREE: u32 = 0;
const WRITING: u32 = 1;
const READY: u32 = 2;
const READING: u32 = 3;
const STATE_MASK: u32 = 0b11;

const SEQ_SHIFT: u32 = 2;
const SEQ_MASK: u32 = u32::MAX >> SEQ_SHIFT;
const SEQ_HALF: u32 = (SEQ_MASK >> 1) + 1;

fn tag(state: u32, seq: u32) -> u32 {
    (seq << SEQ_SHIFT) | state
}

fn state_of(tag: u32) -> u32 {
    tag & STATE_MASK
}

fn seq_of(tag: u32) -> u32 {
    tag >> SEQ_SHIFT
}

/// How many messages ago `seq` was produced, given the next sequence
/// `head`. `None` for sequences not yet produced.
fn age(seq: u32, head: u32) -> Option<u32> {
    let age = head.wrapping_sub(seq) & SEQ_MASK;
    (age != 0 && age < SEQ_HALF).then_some(age)
}

struct Slot<T> {
    tag: AtomicU32,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            tag: AtomicU32::new(FREE),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

pub struct CoreMessageQueue<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Sequence the next published message will carry.
    head: AtomicU32,
    split: AtomicBool,
}

// SAFETY: slot contents are only touched by the side that owns the slot
// according to its tag, and ownership changes through acquire/release
// operations on that tag.
unsafe impl<T: Send, const N: usize> Sync for CoreMessageQueue<T, N> {}

impl<T, const N: usize> CoreMessageQueue<T, N> {
    pub const fn new() -> Self {
        const { assert!(N >= 2, "queue needs at least two slots") };
        Self {
            slots: [const { Slot::new() }; N],
            head: AtomicU32::new(0),
            split: AtomicBool::new(false),
        }
    }

    /// Hand out the two endpoints. `None` after the first call.
    pub fn split(&self) -> Option<(Producer<'_, T, N>, Consumer<'_, T, N>)> {
        if self.split.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((
            Producer {
                queue: self,
                next_seq: 0,
            },
            Consumer { queue: self },
        ))
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Messages published and not yet claimed. A snapshot only.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| state_of(s.tag.load(Ordering::Acquire)) == READY)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest `READY` slot produced before `head`, with its tag.
    fn oldest_ready(&self, head: u32) -> Option<(usize, u32)> {
        let mut oldest: Option<(usize, u32, u32)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let t = slot.tag.load(Ordering::Acquire);
            if state_of(t) != READY {
                continue;
            }
            let Some(a) = age(seq_of(t), head) else {
                continue;
            };
            if oldest.is_none_or(|(_, _, best)| a > best) {
                oldest = Some((i, t, a));
            }
        }
        oldest.map(|(i, t, _)| (i, t))
    }
}

impl<T, const N: usize> Default for CoreMessageQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for CoreMessageQueue<T, N> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            if state_of(*slot.tag.get_mut()) == READY {
                // SAFETY: READY slots hold an initialised value and we have
                // exclusive access.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

// ── Producer ──────────────────────────────────────────────────

pub struct Producer<'q, T, const N: usize> {
    queue: &'q CoreMessageQueue<T, N>,
    next_seq: u32,
}

impl<T, const N: usize> Producer<'_, T, N> {
    /// Enqueue, handing the value back if every slot is occupied.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        match self.free_slot() {
            Some(i) => {
                self.publish(i, value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Enqueue, evicting the oldest unread message if the queue is full.
    /// Returns the evicted message.
    pub fn push_overwrite(&mut self, value: T) -> Option<T> {
        loop {
            if let Some(i) = self.free_slot() {
                self.publish(i, value);
                return None;
            }
            let Some((i, t)) = self.queue.oldest_ready(self.next_seq) else {
                // The consumer holds the only non-free slot and is about to
                // release it.
                core::hint::spin_loop();
                continue;
            };
            let slot = &self.queue.slots[i];
            if slot
                .tag
                .compare_exchange(t, tag(WRITING, seq_of(t)), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            // SAFETY: the CAS moved a READY slot into our ownership.
            let evicted = unsafe { (*slot.value.get()).assume_init_read() };
            self.publish(i, value);
            return Some(evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    fn free_slot(&self) -> Option<usize> {
        self.queue
            .slots
            .iter()
            .position(|s| state_of(s.tag.load(Ordering::Acquire)) == FREE)
    }

    /// Write `value` into slot `i` (owned by the producer) and publish it.
    fn publish(&mut self, i: usize, value: T) {
        let slot = &self.queue.slots[i];
        slot.tag.store(WRITING, Ordering::Relaxed);
        // SAFETY: FREE and WRITING slots are never read by the consumer.
        unsafe { (*slot.value.get()).write(value) };
        slot.tag.store(tag(READY, self.next_seq), Ordering::Release);
        self.next_seq = self.next_seq.wrapping_add(1) & SEQ_MASK;
        self.queue.head.store(self.next_seq, Ordering::Release);
    }
}

// ── Consumer ──────────────────────────────────────────────────

pub struct Consumer<'q, T, const N: usize> {
    queue: &'q CoreMessageQueue<T, N>,
}

impl<T, const N: usize> Consumer<'_, T, N> {
    /// Oldest published message, without blocking.
    pub fn pop(&mut self) -> Option<T> {
        loop {
            let head = self.queue.head.load(Ordering::Acquire);
            let (i, t) = self.queue.oldest_ready(head)?;
            let slot = &self.queue.slots[i];
            if slot
                .tag
                .compare_exchange(t, tag(READING, seq_of(t)), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                // Evicted under us; look again.
                continue;
            }
            // SAFETY: the CAS moved a READY slot into our ownership.
            let value = unsafe { (*slot.value.get()).assume_init_read() };
            slot.tag.store(FREE, Ordering::Release);
            return Some(value);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
