//! Hashed timer wheel used to evict idle connections.
//!
//! The wheel is a fixed ring of `slot_count` slots, each covering one
//! `slot_interval`. A timer is placed `max(1, timeout / slot_interval)` slots
//! ahead of the cursor, and [`TimerWheel::tick`] advances the cursor by one
//! slot and detaches everything it finds there.
//!
//! Nodes live in a [`Slab`] and are chained into per-slot doubly linked lists
//! by key, so insert, remove and expire are all O(1) per timer and no
//! operation ever scans the whole set of outstanding timers.
//!
//! # Horizon
//!
//! The largest representable timeout is `slot_count * slot_interval`. Longer
//! timeouts are silently truncated to that horizon, and there is no sub-slot
//! precision: a timer may fire up to one slot interval early relative to its
//! exact deadline, never later than its slot.

use crate::error::ServerError;
use crate::utils::{Key, Slab};

use std::time::{Duration, Instant};

/// Handle to a scheduled timer, used to cancel it early.
///
/// The handle is generation-checked: once the timer fired or was removed,
/// the handle no longer resolves and removing it again is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TimerHandle(Key);

struct Node<T> {
    owner: T,
    slot: usize,
    prev: Option<Key>,
    next: Option<Key>,
}

pub(crate) struct TimerWheel<T> {
    /// Head of each slot's list.
    slots: Vec<Option<Key>>,

    /// Arena holding every live node.
    nodes: Slab<Node<T>>,

    slot_interval: Duration,

    /// Slot the cursor is on. The next tick expires `current + 1`.
    current: usize,
}

impl<T> TimerWheel<T> {
    /// Creates a wheel with `slot_count` slots of `slot_interval` each.
    ///
    /// Fails if either value is zero, since such a wheel cannot represent
    /// any timeout.
    pub(crate) fn new(slot_count: usize, slot_interval: Duration) -> Result<Self, ServerError> {
        if slot_count == 0 || slot_interval.is_zero() {
            return Err(ServerError::TimerWheel {
                slot_count,
                slot_interval,
            });
        }

        Ok(Self {
            slots: vec![None; slot_count],
            nodes: Slab::with_capacity(64),
            slot_interval,
            current: 0,
        })
    }

    /// Schedules `owner` to expire after `timeout`.
    pub(crate) fn insert(&mut self, owner: T, timeout: Duration) -> TimerHandle {
        let slot = (self.current + self.ticks_for(timeout)) % self.slots.len();
        let head = self.slots[slot];

        let key = self.nodes.insert(Node {
            owner,
            slot,
            prev: None,
            next: head,
        });

        if let Some(head) = head
            && let Some(node) = self.nodes.get_mut(head)
        {
            node.prev = Some(key);
        }

        self.slots[slot] = Some(key);

        TimerHandle(key)
    }

    /// Cancels a timer, returning its owner if it was still pending.
    ///
    /// The node is unlinked from its slot before it is released.
    pub(crate) fn remove(&mut self, handle: TimerHandle) -> Option<T> {
        let node = self.nodes.remove(handle.0)?;

        match node.prev {
            Some(prev) => {
                if let Some(prev) = self.nodes.get_mut(prev) {
                    prev.next = node.next;
                }
            }
            None => self.slots[node.slot] = node.next,
        }

        if let Some(next) = node.next
            && let Some(next) = self.nodes.get_mut(next)
        {
            next.prev = node.prev;
        }

        Some(node.owner)
    }

    /// Advances the cursor by one slot and returns every owner expiring there.
    ///
    /// The slot is left empty for reuse.
    pub(crate) fn tick(&mut self) -> Vec<T> {
        self.current = (self.current + 1) % self.slots.len();

        let mut expired = Vec::new();
        let mut cursor = self.slots[self.current].take();

        while let Some(key) = cursor {
            match self.nodes.remove(key) {
                Some(node) => {
                    cursor = node.next;
                    expired.push(node.owner);
                }
                None => break,
            }
        }

        expired
    }

    /// Number of slots a timeout occupies, clamped to `[1, slot_count]`.
    fn ticks_for(&self, timeout: Duration) -> usize {
        let ticks = timeout.as_nanos() / self.slot_interval.as_nanos();

        (ticks as usize).clamp(1, self.slots.len())
    }

    pub(crate) fn slot_interval(&self) -> Duration {
        self.slot_interval
    }

    /// Longest timeout the wheel can represent.
    pub(crate) fn horizon(&self) -> Duration {
        self.slot_interval * self.slots.len() as u32
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Converts elapsed monotonic time into whole wheel ticks.
///
/// A worker loop wakes at least once per poll timeout, but it may also wake
/// many times per slot under traffic. `TickClock` makes sure the wheel only
/// advances once per elapsed slot interval.
pub(crate) struct TickClock {
    interval: Duration,
    next: Instant,
}

impl TickClock {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    /// Returns how many ticks are due at `now` and moves the clock past them.
    pub(crate) fn due(&mut self, now: Instant) -> u32 {
        let mut due = 0;

        while self.next <= now {
            self.next += self.interval;
            due += 1;
        }

        due
    }

    /// Time left until the next tick is due.
    pub(crate) fn until_next(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }
}
