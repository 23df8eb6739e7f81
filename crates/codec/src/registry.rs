//! Property registry: named, typed slots with stable ordinal enumeration.
//!
//! Slots are registered while the session opens and the registry is then
//! sealed: the member set, registration order and every slot's shape are
//! fixed until close. Only slot contents change afterwards.

use std::collections::HashMap;

use rtv_common::{PropertyDescriptor, PropertyError, PropertyValue, PropertyView, MEMBERS};
use tracing::trace;

struct Slot {
    descriptor: PropertyDescriptor,
    value: PropertyValue,
}

/// Table of named property slots in registration order.
pub struct PropertyRegistry {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    /// Backing storage for the `members` pseudo-property.
    member_count: [i32; 1],
    sealed: bool,
}

impl PropertyRegistry {
    /// Create an empty, unsealed registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            member_count: [0],
            sealed: false,
        }
    }

    /// Register a slot with its initial value. Fails once sealed.
    pub fn register(
        &mut self,
        descriptor: PropertyDescriptor,
        initial: PropertyValue,
    ) -> Result<(), PropertyError> {
        let name = descriptor.name.clone();
        if name == MEMBERS {
            return Err(PropertyError::Reserved { name });
        }
        if self.sealed {
            return Err(PropertyError::Sealed { name });
        }
        if self.index.contains_key(&name) {
            return Err(PropertyError::AlreadyRegistered { name });
        }
        check_shape(&descriptor, &initial)?;

        self.index.insert(name, self.slots.len());
        self.slots.push(Slot {
            descriptor,
            value: initial,
        });
        self.member_count[0] = self.slots.len() as i32;
        Ok(())
    }

    /// Freeze the member set.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of enumerable members (the value of `members`).
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Owned snapshot of a slot.
    pub fn get(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        self.view(name).map(|v| v.to_owned_value())
    }

    /// Borrowed view of a slot, valid until the registry is next mutated.
    pub fn view(&self, name: &str) -> Result<PropertyView<'_>, PropertyError> {
        if name == MEMBERS {
            return Ok(PropertyView::Int(&self.member_count));
        }
        self.slot(name).map(|s| s.value.view())
    }

    /// Name of the member at `ordinal` (registration order).
    pub fn name_at(&self, ordinal: usize) -> Result<&str, PropertyError> {
        self.slots
            .get(ordinal)
            .map(|s| s.descriptor.name.as_str())
            .ok_or(PropertyError::OutOfRange {
                ordinal,
                count: self.slots.len(),
            })
    }

    pub fn descriptor(&self, name: &str) -> Result<&PropertyDescriptor, PropertyError> {
        if name == MEMBERS {
            return Err(PropertyError::Reserved {
                name: name.to_string(),
            });
        }
        self.slot(name).map(|s| &s.descriptor)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.slots.iter().map(|s| &s.descriptor)
    }

    /// Check that `set(name, value)` would succeed, without writing.
    pub fn check_write(&self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        if name == MEMBERS {
            return Err(PropertyError::ReadOnly {
                name: name.to_string(),
            });
        }
        let slot = self.slot(name)?;
        if !slot.descriptor.is_writable() {
            return Err(PropertyError::ReadOnly {
                name: name.to_string(),
            });
        }
        check_shape(&slot.descriptor, value)
    }

    /// Operator write. Read-only slots and `members` are rejected; on any
    /// error the slot is left unchanged.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        self.check_write(name, &value)?;
        let slot = self.slot_mut(name)?;
        slot.value.assign_from(value);
        trace!(property = name, "Property set");
        Ok(())
    }

    /// Encoder-side write that bypasses the access check.
    pub(crate) fn publish(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let slot = self.slot_mut(name)?;
        check_shape(&slot.descriptor, &value)?;
        slot.value.assign_from(value);
        Ok(())
    }

    /// Scalar integer contents of a slot, if it is one.
    pub(crate) fn int(&self, name: &str) -> Option<i32> {
        self.slot(name).ok().and_then(|s| s.value.as_int())
    }

    fn slot(&self, name: &str) -> Result<&Slot, PropertyError> {
        self.index
            .get(name)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| PropertyError::NotFound {
                name: name.to_string(),
            })
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut Slot, PropertyError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.slots[i]),
            None => Err(PropertyError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("members", &self.slots.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}

/// Kind and length must match the descriptor exactly.
fn check_shape(descriptor: &PropertyDescriptor, value: &PropertyValue) -> Result<(), PropertyError> {
    if value.kind() != descriptor.kind {
        return Err(PropertyError::TypeMismatch {
            name: descriptor.name.clone(),
            expected: descriptor.kind,
            got: value.kind(),
        });
    }
    if value.element_count() != descriptor.element_count {
        return Err(PropertyError::LengthMismatch {
            name: descriptor.name.clone(),
            expected: descriptor.element_count,
            got: value.element_count(),
        });
    }
    Ok(())
}
