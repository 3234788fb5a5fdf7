/// A generational slab.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// [`Key`]s made of a slot index and the generation the slot had when the
/// value was inserted. Slots are reused after removal, but every reuse bumps
/// the generation, so a key obtained before a removal never resolves to the
/// value inserted afterwards.
///
/// The reactor relies on this to drop readiness events that were collected
/// for a registration removed earlier in the same turn.
pub(crate) struct Slab<T> {
    /// Storage for entries.
    entries: Vec<Entry<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Identifies one value stored in a [`Slab`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Key {
    /// Packs the key into a single `u64`, e.g. for an epoll token.
    pub(crate) fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Reverses [`Key::to_u64`].
    pub(crate) fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl<T> Slab<T> {
    /// Creates a slab with room for `size` entries before it has to grow.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(size),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value and returns its key.
    ///
    /// A free slot is reused if one exists, otherwise the slab grows.
    pub(crate) fn insert(&mut self, value: T) -> Key {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index];
            entry.value = Some(value);

            return Key {
                index: index as u32,
                generation: entry.generation,
            };
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            generation: 0,
            value: Some(value),
        });

        Key {
            index: index as u32,
            generation: 0,
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index as usize;
        let entry = self.entries.get_mut(index)?;

        if entry.generation != key.generation {
            return None;
        }

        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;

        Some(value)
    }

    /// Returns a reference to the value stored under `key`.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        let entry = self.entries.get(key.index as usize)?;

        if entry.generation != key.generation {
            return None;
        }

        entry.value.as_ref()
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let entry = self.entries.get_mut(key.index as usize)?;

        if entry.generation != key.generation {
            return None;
        }

        entry.value.as_mut()
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}
