//! Descriptor table mapping integer keys to open handles.
//!
//! The table is a slot map: a vector of slots, a free list of vacant slot
//! indices and a generation counter per slot. A key packs the slot index
//! (plus one, so keys are never zero) in its low 32 bits and the slot's
//! generation in the high 32 bits. Removing an entry bumps the slot's
//! generation, so a stale key never resolves to the handle that reuses the
//! slot.
//!
//! ```text
//!  key = generation << 32 | (index + 1)
//!
//!  slots: [ g0 | h ] [ g3 | - ] [ g1 | h ] ...
//!  free:  [ 1 ]
//! ```

use super::FileHandle;
use crate::error::{Error, Result};
use crate::observability;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key identifying one entry of a [`DescriptorTable`]. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorKey(NonZeroU64);

impl DescriptorKey {
    fn new(index: u32, generation: u32) -> Self {
        let raw = (u64::from(generation) << 32) | (u64::from(index) + 1);
        // index + 1 is at least one, so the low half is never zero.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Rebuild a key from its integer form.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The integer form handed out to callers.
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }

    fn index(self) -> Option<usize> {
        let low = (self.0.get() & u64::from(u32::MAX)) as usize;
        low.checked_sub(1)
    }

    fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    handle: Option<Arc<FileHandle>>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Slots {
    fn get(&self, key: DescriptorKey) -> Option<&Slot> {
        let slot = self.slots.get(key.index()?)?;
        (slot.generation == key.generation() && slot.handle.is_some()).then_some(slot)
    }
}

/// Thread-safe table of open handles for one resource class.
///
/// All operations take the table's mutex for a short, I/O free critical
/// section. The table hands out `Arc`s: [`remove`](Self::remove) gives the
/// handle back to the caller, who is responsible for closing it.
pub struct DescriptorTable {
    name: &'static str,
    limit: usize,
    inner: Mutex<Slots>,
}

impl DescriptorTable {
    /// Create an empty table. `name` shows up in error messages.
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            limit,
            inner: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a handle and return its new key.
    ///
    /// Fails with [`Error::TooManyOpenFiles`] once the table holds `limit`
    /// live handles.
    pub fn insert(&self, handle: Arc<FileHandle>) -> Result<DescriptorKey> {
        let mut slots = self.slots();
        if slots.live >= self.limit {
            return Err(Error::TooManyOpenFiles);
        }

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index =
                    u32::try_from(slots.slots.len()).map_err(|_| Error::TooManyOpenFiles)?;
                if index == u32::MAX {
                    return Err(Error::TooManyOpenFiles);
                }
                slots.slots.push(Slot::default());
                index
            }
        };

        let slot = &mut slots.slots[index as usize];
        slot.handle = Some(handle);
        let key = DescriptorKey::new(index, slot.generation);
        slots.live += 1;
        observability::record_open_handles(self.name, slots.live);
        Ok(key)
    }

    /// Look up the handle stored under `key`.
    pub fn get(&self, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        let slots = self.slots();
        slots
            .get(key)
            .and_then(|slot| slot.handle.clone())
            .ok_or_else(|| self.bad_key(key))
    }

    /// Look up a handle by the integer form of its key.
    pub fn get_raw(&self, raw: u64) -> Result<Arc<FileHandle>> {
        let key = DescriptorKey::from_raw(raw)
            .ok_or_else(|| Error::InvalidArgument(format!("{} descriptor 0", self.name)))?;
        self.get(key)
    }

    /// Remove the entry for `key` and hand the handle back.
    ///
    /// The handle is not closed; that is the caller's job.
    pub fn remove(&self, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        let mut slots = self.slots();
        if slots.get(key).is_none() {
            return Err(self.bad_key(key));
        }
        let index = key.index().unwrap_or_default();
        let slot = &mut slots.slots[index];
        let handle = slot.handle.take();
        slot.generation = slot.generation.wrapping_add(1);
        slots.free.push(index as u32);
        slots.live -= 1;
        observability::record_open_handles(self.name, slots.live);
        handle.ok_or_else(|| self.bad_key(key))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots().live
    }

    /// Check if the table holds no handles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Returns how many handles were released.
    ///
    /// Keys issued before the call stay invalid afterwards.
    pub fn clear(&self) -> usize {
        let mut guard = self.slots();
        let Slots { slots, free, live } = &mut *guard;
        let released = *live;
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.handle.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                free.push(index as u32);
            }
        }
        *live = 0;
        observability::record_open_handles(self.name, 0);
        released
    }

    fn bad_key(&self, key: DescriptorKey) -> Error {
        Error::BadFileDescriptor(format!("no open {} with descriptor {}", self.name, key))
    }
}

impl fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("name", &self.name)
            .field("live", &self.len())
            .field("limit", &self.limit)
            .finish()
    }
}
