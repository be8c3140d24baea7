/// A stable, generation-checked handle into a [`Slab`].
///
/// A `Key` stays valid until the value it points at is removed. After that,
/// the slot may be reused, but the old key will never resolve again because
/// the slot generation has moved on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Packs the key into a single `u64`, suitable as a poller token.
    pub(crate) fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpacks a key previously produced by [`to_u64`](Self::to_u64).
    pub(crate) fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slab allocator with generation-checked keys.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// [`Key`]s that can be used for O(1) lookup and removal. Freed slots are
/// reused, and every reuse bumps the slot generation so a stale key held
/// elsewhere resolves to `None` instead of to someone else's value.
///
/// This is the arena behind the timer wheel nodes and the per-worker
/// connection registry.
pub(crate) struct Slab<T> {
    /// Storage for items.
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with room for `capacity` values before it
    /// needs to grow.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its key.
    ///
    /// If a free slot is available, it is reused. Otherwise the slab grows.
    pub(crate) fn insert(&mut self, value: T) -> Key {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].value = Some(value);
                index
            }
            None => {
                let index = self.slots.len();
                debug_assert!(index < u32::MAX as usize - 1, "slab index space exhausted");

                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                index
            }
        };

        self.len += 1;

        Key {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Returns `None` if the key is stale or was never issued by this slab.
    /// Removing twice is therefore harmless.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index())?;

        if slot.generation != key.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free.push(key.index());
        self.len -= 1;

        Some(value)
    }

    /// Returns a mutable reference to the value under `key`, if it is still live.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index())?;

        if slot.generation != key.generation {
            return None;
        }

        slot.value.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns the keys of every live value.
    pub(crate) fn keys(&self) -> Vec<Key> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Key {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}
