//! Slots are the fields of a component which receive injected values. They are safe to read
//! from any thread while providers come and go:
//!
//! * [Reference] - a single value, replaced atomically
//! * [ReferenceList] - a collection; readers always see a complete snapshot, never a partially
//!   applied change
//! * [ActivationSlot] - a value assigned once, right after construction
//!
//! Slots are listed in the component type's field table (see
//! [FieldTable](crate::component_type::FieldTable)), which is how the engine finds them.

use crate::value::InjectedValue;
use arc_swap::ArcSwapOption;
use once_cell::sync::OnceCell;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Slot for a single injected value.
pub struct Reference<T> {
    value: ArcSwapOption<T>,
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self {
            value: ArcSwapOption::empty(),
        }
    }
}

impl<T: Clone> Reference<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently injected value.
    pub fn get(&self) -> Option<T> {
        self.value.load().as_deref().cloned()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.value.load().is_some()
    }

    pub(crate) fn set(&self, value: T) {
        self.value.store(Some(Arc::new(value)));
    }

    pub(crate) fn clear(&self) {
        self.value.store(None);
    }
}

impl<T> Debug for Reference<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("is_set", &self.value.load().is_some())
            .finish()
    }
}

struct ListContainer<T> {
    values: Vec<T>,
    modifiable: bool,
}

/// Slot for a collection of injected values.
///
/// A list starts without a container. Depending on how the dependency is updated, the engine
/// either installs a fresh immutable snapshot on every change, or allocates a modifiable
/// container once and then adds/removes single values. A list created with
/// [ReferenceList::frozen] holds an unmodifiable container, which cannot be updated in place.
pub struct ReferenceList<T> {
    container: ArcSwapOption<ListContainer<T>>,
}

impl<T> Default for ReferenceList<T> {
    fn default() -> Self {
        Self {
            container: ArcSwapOption::empty(),
        }
    }
}

impl<T: InjectedValue> ReferenceList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list with a modifiable container holding given values.
    pub fn with_values(values: Vec<T>) -> Self {
        Self {
            container: ArcSwapOption::from_pointee(ListContainer {
                values,
                modifiable: true,
            }),
        }
    }

    /// Creates a list with an unmodifiable container holding given values.
    pub fn frozen(values: Vec<T>) -> Self {
        Self {
            container: ArcSwapOption::from_pointee(ListContainer {
                values,
                modifiable: false,
            }),
        }
    }

    /// Returns a consistent snapshot of the current values.
    pub fn values(&self) -> Vec<T> {
        self.container
            .load()
            .as_ref()
            .map(|container| container.values.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.container
            .load()
            .as_ref()
            .map(|container| container.values.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the list holds a container, even an empty one.
    pub fn has_container(&self) -> bool {
        self.container.load().is_some()
    }

    /// Installs a new immutable snapshot.
    pub(crate) fn install(&self, values: Vec<T>) {
        self.container.store(Some(Arc::new(ListContainer {
            values,
            modifiable: false,
        })));
    }

    /// Makes sure a modifiable container exists. Returns false if an unmodifiable one is present.
    pub(crate) fn ensure_modifiable(&self) -> bool {
        let mut modifiable = true;
        self.container.rcu(|current| match current {
            Some(container) => {
                modifiable = container.modifiable;
                Some(container.clone())
            }
            None => {
                modifiable = true;
                Some(Arc::new(ListContainer {
                    values: vec![],
                    modifiable: true,
                }))
            }
        });

        modifiable
    }

    pub(crate) fn push(&self, value: T) -> bool {
        self.modify(|values| {
            values.push(value.clone());
            true
        })
    }

    /// Removes the value which is the same as given one. Missing values are ignored.
    pub(crate) fn remove_same(&self, value: &T) -> bool {
        self.modify(|values| {
            if let Some(index) = values.iter().position(|current| current.is_same(value)) {
                values.remove(index);
                true
            } else {
                false
            }
        })
    }

    /// Replaces the old value at its position, or appends the new one if the old is missing.
    pub(crate) fn replace_same(&self, old: &T, new: T) -> bool {
        self.modify(|values| {
            if let Some(index) = values.iter().position(|current| current.is_same(old)) {
                values[index] = new.clone();
            } else {
                values.push(new.clone());
            }
            true
        })
    }

    fn modify<F: FnMut(&mut Vec<T>) -> bool>(&self, mut change: F) -> bool {
        let mut changed = false;
        self.container.rcu(|current| match current {
            Some(container) if container.modifiable => {
                let mut values = container.values.clone();
                changed = change(&mut values);
                Some(Arc::new(ListContainer {
                    values,
                    modifiable: true,
                }))
            }
            other => {
                changed = false;
                other.clone()
            }
        });

        changed
    }
}

impl<T> Debug for ReferenceList<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let container = self.container.load();
        f.debug_struct("ReferenceList")
            .field(
                "len",
                &container.as_ref().map(|container| container.values.len()),
            )
            .finish()
    }
}

/// Slot assigned once, after the instance is constructed.
#[derive(Debug)]
pub struct ActivationSlot<T> {
    value: OnceCell<T>,
}

impl<T> Default for ActivationSlot<T> {
    fn default() -> Self {
        Self {
            value: OnceCell::new(),
        }
    }
}

impl<T> ActivationSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub(crate) fn assign(&self, value: T) -> bool {
        self.value.set(value).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::provider::{Properties, ProviderHandle};
    use crate::slot::{ActivationSlot, Reference, ReferenceList};
    use std::sync::Arc;

    fn handle(id: u64) -> ProviderHandle {
        ProviderHandle::for_service(id, Arc::new(id), Properties::new())
    }

    #[test]
    fn should_set_and_clear_reference() {
        let reference = Reference::new();
        assert!(reference.get().is_none());

        reference.set(5);
        assert_eq!(reference.get(), Some(5));

        reference.clear();
        assert!(!reference.is_set());
    }

    #[test]
    fn should_update_modifiable_list() {
        let list = ReferenceList::<ProviderHandle>::new();
        assert!(!list.has_container());
        assert!(list.ensure_modifiable());
        assert!(list.has_container());

        let (a, b) = (handle(1), handle(2));
        list.push(a.clone());
        list.push(b.clone());
        assert!(list.remove_same(&a));
        assert!(!list.remove_same(&a));

        let values = list.values();
        assert_eq!(values.len(), 1);
        assert!(values[0].ptr_eq(&b));
    }

    #[test]
    fn should_replace_in_position() {
        let (a, b, c) = (handle(1), handle(2), handle(3));
        let list = ReferenceList::with_values(vec![a.clone(), b.clone()]);

        list.replace_same(&a, c.clone());

        let values = list.values();
        assert!(values[0].ptr_eq(&c));
        assert!(values[1].ptr_eq(&b));
    }

    #[test]
    fn should_not_modify_frozen_list() {
        let list = ReferenceList::frozen(vec![handle(1)]);

        assert!(!list.ensure_modifiable());
        assert!(!list.push(handle(2)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn should_install_snapshots() {
        let list = ReferenceList::<ProviderHandle>::new();
        list.install(vec![handle(1), handle(2)]);

        assert_eq!(list.len(), 2);
        assert!(!list.push(handle(3)));
    }

    #[test]
    fn should_assign_activation_slot_once() {
        let slot = ActivationSlot::new();

        assert!(slot.assign(1));
        assert!(!slot.assign(2));
        assert_eq!(slot.get(), Some(&1));
    }
}
