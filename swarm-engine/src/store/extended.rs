// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Per-kind extended columns and global/local index translation
//!
//! A kind may declare fields beyond the core schema. Those live in a
//! separate, smaller block sized for that kind's slot range only, addressed
//! by local index. Translation between global and local indices is a pair of
//! precomputed arrays built at registration, so lookups are O(1) in both
//! directions.

use super::schema::{ColumnElement, FieldDesc, Layout};

/// Extra columns for one entity kind, beyond the core schema.
///
/// Fields are declared at registration as runtime descriptors; the layout is
/// computed the same way as the core block, but at the kind's instance count
/// rather than the global capacity.
pub struct ExtendedStore {
    fields: Vec<FieldDesc>,
    block: Box<[u64]>,
    layout: Layout,
}

impl ExtendedStore {
    /// Allocate zero-initialized extended columns for `count` local slots.
    pub fn allocate(fields: Vec<FieldDesc>, count: usize) -> Self {
        let layout = Layout::compute(&fields, count);
        let words = (layout.total_bytes() + 7) / 8;
        ExtendedStore {
            fields,
            block: vec![0u64; words].into_boxed_slice(),
            layout,
        }
    }

    /// Declared extended fields, in layout order.
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Number of local slots.
    pub fn count(&self) -> usize {
        self.layout.capacity()
    }

    fn field_index(&self, name: &str) -> usize {
        match self.fields.iter().position(|f| f.name == name) {
            Some(i) => i,
            None => panic!("unknown extended field '{name}'"),
        }
    }

    /// Typed view of an extended column, indexed by local slot.
    ///
    /// # Panics
    ///
    /// Panics if the field name is unknown or `T` does not match the
    /// declared element type.
    pub fn column<T: ColumnElement>(&self, name: &str) -> &[T] {
        let index = self.field_index(name);
        let desc = self.fields[index];
        assert!(
            desc.kind == T::KIND,
            "extended field '{}' accessed with the wrong element type",
            desc.name
        );
        let total = self.layout.total_bytes();
        let bytes: &[u8] = &bytemuck::cast_slice(&self.block)[..total];
        bytemuck::cast_slice(&bytes[self.layout.byte_range(index)])
    }

    /// Typed mutable view of an extended column, indexed by local slot.
    ///
    /// # Panics
    ///
    /// Same conditions as [`ExtendedStore::column`].
    pub fn column_mut<T: ColumnElement>(&mut self, name: &str) -> &mut [T] {
        let index = self.field_index(name);
        let desc = self.fields[index];
        assert!(
            desc.kind == T::KIND,
            "extended field '{}' accessed with the wrong element type",
            desc.name
        );
        let total = self.layout.total_bytes();
        let range = self.layout.byte_range(index);
        let bytes: &mut [u8] = &mut bytemuck::cast_slice_mut(&mut self.block)[..total];
        bytemuck::cast_slice_mut(&mut bytes[range])
    }
}

/// Bidirectional translation between global slot indices and a kind's local
/// indices.
///
/// Both directions are direct array lookups; nothing is searched per frame.
/// Kinds occupy contiguous global ranges, so local index i maps to global
/// `start + i`, but callers go through the map rather than assuming that.
pub struct IndexMap {
    global_to_local: Vec<u32>,
    local_to_global: Vec<u32>,
}

impl IndexMap {
    const NONE: u32 = u32::MAX;

    /// Build the map for a kind occupying `start..start + count` of a store
    /// with `capacity` global slots.
    pub fn new(capacity: usize, start: usize, count: usize) -> Self {
        let mut global_to_local = vec![Self::NONE; capacity];
        let mut local_to_global = Vec::with_capacity(count);
        for local in 0..count {
            global_to_local[start + local] = local as u32;
            local_to_global.push((start + local) as u32);
        }
        IndexMap {
            global_to_local,
            local_to_global,
        }
    }

    /// Local index for a global slot, or `None` if the slot belongs to a
    /// different kind.
    pub fn local(&self, global: usize) -> Option<usize> {
        match self.global_to_local[global] {
            Self::NONE => None,
            local => Some(local as usize),
        }
    }

    /// Global slot for a local index.
    pub fn global(&self, local: usize) -> usize {
        self.local_to_global[local] as usize
    }

    /// Number of local slots.
    pub fn count(&self) -> usize {
        self.local_to_global.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema::FieldKind;
    use super::*;

    fn energy_fields() -> Vec<FieldDesc> {
        vec![
            FieldDesc {
                name: "energy",
                kind: FieldKind::F32,
            },
            FieldDesc {
                name: "hunt_cooldown",
                kind: FieldKind::U32,
            },
        ]
    }

    #[test]
    fn test_extended_columns_read_write() {
        let mut ext = ExtendedStore::allocate(energy_fields(), 10);
        assert_eq!(ext.count(), 10);
        ext.column_mut::<f32>("energy")[4] = 0.75;
        ext.column_mut::<u32>("hunt_cooldown")[9] = 120;
        assert_eq!(ext.column::<f32>("energy")[4], 0.75);
        assert_eq!(ext.column::<u32>("hunt_cooldown")[9], 120);
        assert_eq!(ext.column::<f32>("energy")[5], 0.0);
    }

    #[test]
    #[should_panic(expected = "unknown extended field")]
    fn test_unknown_field_panics() {
        let ext = ExtendedStore::allocate(energy_fields(), 4);
        let _ = ext.column::<f32>("stamina");
    }

    #[test]
    #[should_panic(expected = "wrong element type")]
    fn test_mismatched_type_panics() {
        let ext = ExtendedStore::allocate(energy_fields(), 4);
        let _ = ext.column::<u32>("energy");
    }

    #[test]
    fn test_index_map_round_trip() {
        let map = IndexMap::new(100, 40, 10);
        assert_eq!(map.count(), 10);
        assert_eq!(map.local(40), Some(0));
        assert_eq!(map.local(49), Some(9));
        assert_eq!(map.local(39), None);
        assert_eq!(map.local(50), None);
        assert_eq!(map.global(0), 40);
        assert_eq!(map.global(9), 49);
    }
}
