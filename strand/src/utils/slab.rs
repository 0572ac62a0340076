/// A slot inside a [`Slab`].
enum Slot<T> {
    Occupied(T),
    Vacant,
}

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and returns
/// stable indices that can be reused after removal. The reactor uses it
/// for poller tokens, timer and idle keys; the loop uses it for task ids.
///
/// Unlike a plain `Vec`, removing an entry never shifts the others, so an
/// index handed out by [`insert`](Self::insert) stays valid until that
/// very entry is removed.
pub(crate) struct Slab<T> {
    /// Storage for items.
    slots: Vec<Slot<T>>,

    /// Stack of free indices that can be reused.
    free: Vec<usize>,

    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with room for `size` entries.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(size),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// Free slots are reused most-recently-freed first; otherwise the
    /// backing vector grows (amortized doubling).
    pub(crate) fn insert(&mut self, item: T) -> usize {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            self.slots[index] = Slot::Occupied(item);
            index
        } else {
            self.slots.push(Slot::Occupied(item));
            self.slots.len() - 1
        }
    }

    /// Returns the index the next [`insert`](Self::insert) will use.
    pub(crate) fn vacant_key(&self) -> usize {
        self.free.last().copied().unwrap_or(self.slots.len())
    }

    /// Removes and returns the value stored at `index`, if any.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;

        match std::mem::replace(slot, Slot::Vacant) {
            Slot::Occupied(item) => {
                self.free.push(index);
                self.len -= 1;
                Some(item)
            }
            Slot::Vacant => None,
        }
    }

    /// Returns a reference to the value at `index`, if occupied.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        match self.slots.get(index) {
            Some(Slot::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value at `index`, if occupied.
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.slots.get_mut(index) {
            Some(Slot::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    /// Returns `true` if `index` currently holds a value.
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over occupied slots as `(index, &value)`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied(item) => Some((index, item)),
                Slot::Vacant => None,
            })
    }

    /// Removes every value, returning them in index order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.free.clear();
        self.len = 0;

        std::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(item) => Some(item),
                Slot::Vacant => None,
            })
            .collect()
    }
}
