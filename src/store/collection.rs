//! A normalized id → entity map for one resource.

use alloc::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::Entity;

/// Normalized storage for one entity type, ordered by id.
///
/// Serializes as an `id → entity` JSON object.
///
/// Pure data: holds no derived state and knows nothing about indexes.
/// All mutators report what they replaced or removed so callers can
/// maintain derived structures and build rollback data.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<E: Entity> {
    /// Entities keyed by id.
    items: BTreeMap<E::Id, E>,
}

impl<E: Entity> Default for Collection<E> {
    #[inline]
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<E: Entity> Collection<E> {
    /// Replaces the whole collection, returning the previous contents.
    #[inline]
    pub fn set<I: IntoIterator<Item = E>>(&mut self, items: I) -> Vec<E> {
        let replaced = core::mem::take(&mut self.items);
        self.items = items
            .into_iter()
            .map(|item| (item.id().clone(), item))
            .collect();
        replaced.into_values().collect()
    }

    /// Inserts or replaces an entity, returning the previous value.
    #[inline]
    pub fn add(&mut self, item: E) -> Option<E> {
        self.items.insert(item.id().clone(), item)
    }

    /// Inserts or replaces several entities, returning every replaced
    /// value.
    #[inline]
    pub fn add_many<I: IntoIterator<Item = E>>(&mut self, items: I) -> Vec<E> {
        items.into_iter().filter_map(|item| self.add(item)).collect()
    }

    /// Replaces an existing entity, returning the previous value.
    ///
    /// Returns `None` and leaves the collection untouched if the entity
    /// is not present.
    #[inline]
    pub fn update(&mut self, item: E) -> Option<E> {
        let slot = self.items.get_mut(item.id())?;
        Some(core::mem::replace(slot, item))
    }

    /// Removes an entity by id.
    #[inline]
    pub fn delete(&mut self, id: &E::Id) -> Option<E> {
        self.items.remove(id)
    }

    /// Looks up an entity by id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.items.get(id)
    }

    /// Returns `true` if an entity with this id is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &E::Id) -> bool {
        self.items.contains_key(id)
    }

    /// Iterates over entities in id order.
    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.items.values()
    }

    /// Returns the number of stored entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the collection is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<E: Entity> Serialize for Collection<E> {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, E: Entity> Deserialize<'de> for Collection<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = BTreeMap::<E::Id, E>::deserialize(deserializer)?;
        if let Some((key, item)) = items.iter().find(|&(key, item)| key != item.id()) {
            return Err(D::Error::custom(format!(
                "{} keyed {key} has id {}",
                E::RESOURCE,
                item.id()
            )));
        }
        Ok(Self { items })
    }
}
