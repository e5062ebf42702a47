// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-process handle table.
//!
//! Maps small integers to [`Handle`]s. Slots can be reserved ahead of an
//! operation so that, once the operation has committed (a connection was
//! accepted, a port was created), installing its handle cannot fail.

use std::fmt;

use parking_lot::Mutex;

use crate::error::{IpcError, Result};
use crate::object::{Handle, ObjectType};

/// Index of a handle in its process table.
pub type HandleId = u32;

enum Slot {
    Free,
    Reserved,
    Used(Handle),
}

/// Fixed-size table of open handles.
pub struct HandleTable {
    slots: Mutex<Vec<Slot>>,
}

impl HandleTable {
    /// Creates an empty table with `slots` entries.
    pub fn with_capacity(slots: usize) -> Self {
        let mut table = Vec::with_capacity(slots);
        table.resize_with(slots, || Slot::Free);
        Self { slots: Mutex::new(table) }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of slots holding a handle.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| matches!(s, Slot::Used(_))).count()
    }

    /// Returns `true` if no handle is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims the lowest free slot without installing anything yet.
    pub fn reserve(&self) -> Result<Reservation<'_>> {
        let mut slots = self.slots.lock();
        match slots.iter().position(|s| matches!(s, Slot::Free)) {
            Some(index) => {
                slots[index] = Slot::Reserved;
                Ok(Reservation { table: self, id: index as HandleId, filled: false })
            }
            None => {
                log::warn!(target: "ipc", "handle table full ({} slots)", slots.len());
                Err(IpcError::ResourceExhausted)
            }
        }
    }

    /// Installs `handle` in the lowest free slot.
    pub fn insert(&self, handle: Handle) -> Result<HandleId> {
        Ok(self.reserve()?.fill(handle))
    }

    /// Looks up a handle of any type.
    pub fn get(&self, id: HandleId) -> Result<Handle> {
        match self.slots.lock().get(id as usize) {
            Some(Slot::Used(handle)) => Ok(handle.clone()),
            _ => Err(IpcError::NotFound),
        }
    }

    /// Looks up a handle that must refer to an object of type `ty`.
    pub fn get_typed(&self, id: HandleId, ty: ObjectType) -> Result<Handle> {
        let handle = self.get(id)?;
        if handle.object_type() != ty {
            return Err(IpcError::InvalidHandleType);
        }
        Ok(handle)
    }

    /// Installs another reference to the handle at `id`.
    pub fn duplicate(&self, id: HandleId) -> Result<HandleId> {
        let handle = self.get(id)?;
        self.insert(handle)
    }

    /// Removes the handle at `id`. The object is closed once no other
    /// reference remains.
    pub fn close(&self, id: HandleId) -> Result<()> {
        let handle = {
            let mut slots = self.slots.lock();
            match slots.get_mut(id as usize) {
                Some(slot) if matches!(slot, Slot::Used(_)) => std::mem::replace(slot, Slot::Free),
                _ => return Err(IpcError::NotFound),
            }
        };
        // Close callbacks take other locks; run them with the table unlocked.
        drop(handle);
        Ok(())
    }

    /// Closes every handle, as on process exit. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter(|s| matches!(s, Slot::Used(_)))
                .map(|s| std::mem::replace(s, Slot::Free))
                .collect()
        };
        drained.len()
    }
}

/// A reserved slot. Released again unless filled.
pub struct Reservation<'a> {
    table: &'a HandleTable,
    id: HandleId,
    filled: bool,
}

impl Reservation<'_> {
    /// Id the handle will get.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Installs `handle` in the reserved slot.
    pub fn fill(mut self, handle: Handle) -> HandleId {
        self.table.slots.lock()[self.id as usize] = Slot::Used(handle);
        self.filled = true;
        self.id
    }
}

impl fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("id", &self.id).field("filled", &self.filled).finish()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.filled {
            self.table.slots.lock()[self.id as usize] = Slot::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::KernelObject;
    use proptest::prelude::*;
    use std::any::Any;

    struct Dummy(ObjectType);

    impl KernelObject for Dummy {
        fn object_type(&self) -> ObjectType {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn dummy(ty: ObjectType) -> Handle {
        Handle::new(Dummy(ty))
    }

    #[test]
    fn exhaustion_is_reported() {
        let table = HandleTable::with_capacity(2);
        table.insert(dummy(ObjectType::Port)).unwrap();
        table.insert(dummy(ObjectType::Port)).unwrap();
        assert_eq!(table.insert(dummy(ObjectType::Port)).unwrap_err(), IpcError::ResourceExhausted);
        table.close(0).unwrap();
        assert_eq!(table.insert(dummy(ObjectType::Port)).unwrap(), 0);
    }

    #[test]
    fn typed_lookup_checks_type() {
        let table = HandleTable::with_capacity(4);
        let id = table.insert(dummy(ObjectType::Port)).unwrap();
        assert!(table.get_typed(id, ObjectType::Port).is_ok());
        assert_eq!(table.get_typed(id, ObjectType::Connection).unwrap_err(), IpcError::InvalidHandleType);
        assert_eq!(table.get(3).unwrap_err(), IpcError::NotFound);
        assert_eq!(table.get(99).unwrap_err(), IpcError::NotFound);
    }

    #[test]
    fn dropped_reservation_frees_slot() {
        let table = HandleTable::with_capacity(1);
        {
            let slot = table.reserve().unwrap();
            assert_eq!(slot.id(), 0);
            assert_eq!(format!("{slot:?}"), "Reservation { id: 0, filled: false }");
            assert_eq!(table.reserve().unwrap_err(), IpcError::ResourceExhausted);
            assert_eq!(table.get(0).unwrap_err(), IpcError::NotFound);
        }
        assert_eq!(table.reserve().unwrap().fill(dummy(ObjectType::Port)), 0);
    }

    #[test]
    fn duplicate_shares_reference() {
        let table = HandleTable::with_capacity(4);
        let a = table.insert(dummy(ObjectType::Connection)).unwrap();
        let b = table.duplicate(a).unwrap();
        assert_ne!(a, b);
        assert!(table.get(a).unwrap().ptr_eq(&table.get(b).unwrap()));
        assert_eq!(table.close_all(), 2);
        assert!(table.is_empty());
    }

    proptest! {
        #[test]
        fn ids_are_unique_while_open(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
            let table = HandleTable::with_capacity(16);
            let mut open: Vec<HandleId> = Vec::new();
            for insert in ops {
                if insert || open.is_empty() {
                    match table.insert(dummy(ObjectType::Port)) {
                        Ok(id) => {
                            prop_assert!(!open.contains(&id));
                            open.push(id);
                        }
                        Err(err) => {
                            prop_assert_eq!(err, IpcError::ResourceExhausted);
                            prop_assert_eq!(open.len(), 16);
                        }
                    }
                } else {
                    let id = open.remove(0);
                    table.close(id).unwrap();
                }
            }
            prop_assert_eq!(table.len(), open.len());
        }
    }
}
