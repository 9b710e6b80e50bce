use std::collections::TryReserveError;

/// Stable handle to a value stored in a [`Slab`].
///
/// A key carries the generation of its slot. Once the value is removed the
/// slot's generation moves on, so the old key never resolves again, even
/// after the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Packs the key into a `u64`, e.g. for `epoll_event.u64`.
    pub(crate) fn to_u64(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Inverse of [`to_u64`](Self::to_u64).
    pub(crate) fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    fn slot(self) -> usize {
        self.index as usize
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            generation: 0,
            value: None,
        }
    }
}

/// A generational slab.
///
/// A `Slab` stores values in a contiguous array and hands out [`Key`]s that
/// stay valid until the value is removed. Freed slots are reused; a stale key
/// simply fails to resolve.
///
/// Every registration table in the crate (host sources, bridge entries,
/// native backend sources) is one of these.
pub(crate) struct Slab<T> {
    /// Storage, vacant slots hold `None`.
    slots: Vec<Slot<T>>,
    /// Stack of free slot indices.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a slab with `size` vacant slots.
    pub(crate) fn new(size: usize) -> Self {
        let slots = (0..size).map(|_| Slot::vacant()).collect();
        let free = (0..size).rev().collect();

        Self {
            slots,
            free,
            len: 0,
        }
    }

    /// Inserts a value and returns its key, growing the slab if needed.
    pub(crate) fn insert(&mut self, item: T) -> Key {
        if self.free.is_empty() {
            self.grow();
        }

        self.occupy(item)
    }

    /// Like [`insert`](Self::insert), but reports allocation failure instead
    /// of aborting. On error the slab is unchanged and `item` is dropped.
    pub(crate) fn try_insert(&mut self, item: T) -> Result<Key, TryReserveError> {
        if self.free.is_empty() {
            let additional = self.slots.len().max(1);
            self.slots.try_reserve(additional)?;
            self.free.try_reserve(additional)?;
            self.grow();
        }

        Ok(self.occupy(item))
    }

    /// Like [`new`](Self::new), but reports allocation failure instead of
    /// aborting.
    pub(crate) fn try_with_capacity(size: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        let mut free = Vec::new();
        slots.try_reserve_exact(size)?;
        free.try_reserve_exact(size)?;

        slots.extend((0..size).map(|_| Slot::vacant()));
        free.extend((0..size).rev());

        Ok(Self {
            slots,
            free,
            len: 0,
        })
    }

    /// Removes and returns the value behind `key`.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.slot())?;
        if slot.generation != key.generation {
            return None;
        }

        let item = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.slot());
        self.len -= 1;

        Some(item)
    }

    /// Returns a reference to the value behind `key`, if it is still live.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.slot())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Returns a mutable reference to the value behind `key`, if it is still live.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keys of every live value, in slot order.
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

    fn grow(&mut self) {
        let len = self.slots.len();
        let new_len = if len == 0 { 1 } else { 2 * len };

        self.slots.extend((len..new_len).map(|_| Slot::vacant()));
        self.free.extend((len..new_len).rev());
    }

    fn occupy(&mut self, item: T) -> Key {
        // `grow` guarantees a free slot.
        let index = self.free.pop().unwrap_or(self.slots.len());
        if index == self.slots.len() {
            self.slots.push(Slot::vacant());
        }

        let slot = &mut self.slots[index];
        slot.value = Some(item);
        self.len += 1;

        Key {
            index: index as u32,
            generation: slot.generation,
        }
    }
}
