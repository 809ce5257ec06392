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
//! Shared columnar entity store
//!
//! One fixed-width array per attribute, all backed by a single shared byte
//! block sized once for the maximum entity count. An entity is an index into
//! every array at once; no object aggregates its own storage, and entities
//! are never moved or reindexed.
//!
//! The store enforces the single-writer-per-field-per-phase convention
//! structurally: [`EntityStore::columns_mut`] splits the block into disjoint
//! mutable column slices in one pass, and each pipeline phase receives only
//! the columns it is the designated writer of. Two phases writing the same
//! field in the same frame is then a borrow error, not a latent race.

mod extended;
mod neighbors;
mod schema;

pub use extended::{ExtendedStore, IndexMap};
pub use neighbors::{NeighborBuffer, PairBuffer};
pub use schema::{core_fields, ColumnElement, Field, FieldDesc, FieldKind, Layout};

/// Columnar storage for the core schema.
///
/// The backing block is allocated once at startup and never grows. Columns
/// are addressed through accessors generated from the schema declaration
/// (see [`schema`](self)); every read and write path in the engine is the
/// same generated path.
///
/// # Examples
///
/// ```
/// use swarm_engine::store::{EntityStore, Field};
///
/// let mut store = EntityStore::allocate(128);
/// store.set::<f32>(Field::X, 7, 42.0);
/// assert_eq!(store.xs()[7], 42.0);
/// assert_eq!(store.capacity(), 128);
/// ```
pub struct EntityStore {
    // u64 backing keeps every 4-byte column offset aligned.
    block: Box<[u64]>,
    layout: Layout,
    capacity: usize,
}

impl EntityStore {
    /// Allocate a zero-initialized store for `capacity` entities.
    ///
    /// The byte layout is alignment-respecting and computed from the schema;
    /// all field arrays share the one block.
    pub fn allocate(capacity: usize) -> Self {
        assert!(capacity > 0, "entity capacity must be nonzero");
        let fields = core_fields();
        let layout = Layout::compute(&fields, capacity);
        let words = (layout.total_bytes() + 7) / 8;
        EntityStore {
            block: vec![0u64; words].into_boxed_slice(),
            layout,
            capacity,
        }
    }

    /// Total bytes the core schema needs at `capacity`, without allocating.
    pub fn buffer_size(capacity: usize) -> usize {
        Layout::buffer_size(&core_fields(), capacity)
    }

    /// Number of entity slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.block)[..self.layout.total_bytes()]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let total = self.layout.total_bytes();
        &mut bytemuck::cast_slice_mut(&mut self.block)[..total]
    }

    /// Typed view of one column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the field's declared element type: that is a
    /// programming error, not a runtime condition.
    pub fn column<T: ColumnElement>(&self, field: Field) -> &[T] {
        let desc = field.desc();
        assert!(
            desc.kind == T::KIND,
            "field '{}' accessed with the wrong element type",
            desc.name
        );
        let range = self.layout.byte_range(field.index());
        bytemuck::cast_slice(&self.bytes()[range])
    }

    /// Typed mutable view of one column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the field's declared element type.
    pub fn column_mut<T: ColumnElement>(&mut self, field: Field) -> &mut [T] {
        let desc = field.desc();
        assert!(
            desc.kind == T::KIND,
            "field '{}' accessed with the wrong element type",
            desc.name
        );
        let range = self.layout.byte_range(field.index());
        bytemuck::cast_slice_mut(&mut self.bytes_mut()[range])
    }

    /// Read a single element.
    pub fn get<T: ColumnElement>(&self, field: Field, index: usize) -> T {
        self.column::<T>(field)[index]
    }

    /// Write a single element.
    pub fn set<T: ColumnElement>(&mut self, field: Field, index: usize, value: T) {
        self.column_mut::<T>(field)[index] = value;
    }

    /// Split the store into disjoint mutable column views in one pass.
    ///
    /// This is the seam the frame pipeline is built on: the borrow checker
    /// guarantees the slices are non-overlapping, so phases can hold mutable
    /// access to their own fields while reading everyone else's.
    pub fn columns_mut(&mut self) -> Columns<'_> {
        let capacity = self.capacity;
        let total = self.layout.total_bytes();
        let bytes: &mut [u8] = &mut bytemuck::cast_slice_mut(&mut self.block)[..total];
        let mut cursor = SplitCursor {
            rest: bytes,
            pos: 0,
        };
        let layout = &self.layout;

        Columns {
            x: cursor.take(layout.offset(Field::X.index()), capacity),
            y: cursor.take(layout.offset(Field::Y.index()), capacity),
            vx: cursor.take(layout.offset(Field::Vx.index()), capacity),
            vy: cursor.take(layout.offset(Field::Vy.index()), capacity),
            ax: cursor.take(layout.offset(Field::Ax.index()), capacity),
            ay: cursor.take(layout.offset(Field::Ay.index()), capacity),
            rotation: cursor.take(layout.offset(Field::Rotation.index()), capacity),
            speed: cursor.take(layout.offset(Field::Speed.index()), capacity),
            max_velocity: cursor.take(layout.offset(Field::MaxVelocity.index()), capacity),
            max_acceleration: cursor.take(layout.offset(Field::MaxAcceleration.index()), capacity),
            min_speed: cursor.take(layout.offset(Field::MinSpeed.index()), capacity),
            friction: cursor.take(layout.offset(Field::Friction.index()), capacity),
            radius: cursor.take(layout.offset(Field::Radius.index()), capacity),
            visual_range: cursor.take(layout.offset(Field::VisualRange.index()), capacity),
            type_tag: cursor.take(layout.offset(Field::TypeTag.index()), capacity),
            active: cursor.take(layout.offset(Field::Active.index()), capacity),
            on_screen: cursor.take(layout.offset(Field::OnScreen.index()), capacity),
        }
    }
}

/// Sequentially carves typed column slices off one mutable byte block.
struct SplitCursor<'a> {
    rest: &'a mut [u8],
    pos: usize,
}

impl<'a> SplitCursor<'a> {
    fn take<T: ColumnElement>(&mut self, offset: usize, count: usize) -> &'a mut [T] {
        debug_assert!(offset >= self.pos, "schema fields must be split in order");
        let rest = std::mem::take(&mut self.rest);
        let rest = &mut rest[offset - self.pos..];
        let (head, tail) = rest.split_at_mut(count * std::mem::size_of::<T>());
        self.rest = tail;
        self.pos = offset + count * std::mem::size_of::<T>();
        bytemuck::cast_slice_mut(head)
    }
}

/// Disjoint mutable views of every core column.
///
/// Field names match the schema declaration. Obtained from
/// [`EntityStore::columns_mut`] and destructured by the frame pipeline so
/// each phase signature names exactly the columns it writes.
pub struct Columns<'a> {
    /// Position, x.
    pub x: &'a mut [f32],
    /// Position, y.
    pub y: &'a mut [f32],
    /// Velocity, x.
    pub vx: &'a mut [f32],
    /// Velocity, y.
    pub vy: &'a mut [f32],
    /// Acceleration, x.
    pub ax: &'a mut [f32],
    /// Acceleration, y.
    pub ay: &'a mut [f32],
    /// Facing angle.
    pub rotation: &'a mut [f32],
    /// Clamped speed.
    pub speed: &'a mut [f32],
    /// Speed ceiling.
    pub max_velocity: &'a mut [f32],
    /// Acceleration ceiling.
    pub max_acceleration: &'a mut [f32],
    /// Speed floor.
    pub min_speed: &'a mut [f32],
    /// Velocity decay coefficient.
    pub friction: &'a mut [f32],
    /// Collision radius.
    pub radius: &'a mut [f32],
    /// Perception radius.
    pub visual_range: &'a mut [f32],
    /// Kind id per slot.
    pub type_tag: &'a mut [u32],
    /// Liveness flag per slot.
    pub active: &'a mut [u8],
    /// Screen-visibility flag, written by the spatial phase.
    pub on_screen: &'a mut [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let store = EntityStore::allocate(64);
        assert_eq!(store.capacity(), 64);
        assert!(store.xs().iter().all(|&v| v == 0.0));
        assert!(store.actives().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_every_column_has_capacity_length() {
        let store = EntityStore::allocate(33);
        assert_eq!(store.xs().len(), 33);
        assert_eq!(store.frictions().len(), 33);
        assert_eq!(store.type_tags().len(), 33);
        assert_eq!(store.actives().len(), 33);
        assert_eq!(store.on_screen_flags().len(), 33);
    }

    #[test]
    fn test_buffer_size_without_allocating() {
        assert_eq!(
            EntityStore::buffer_size(100),
            Layout::buffer_size(&core_fields(), 100)
        );
    }

    #[test]
    fn test_generated_accessors_share_the_block() {
        let mut store = EntityStore::allocate(8);
        store.xs_mut()[3] = 1.5;
        store.set::<f32>(Field::Y, 3, -2.5);
        store.type_tags_mut()[3] = 7;
        store.actives_mut()[3] = 1;

        assert_eq!(store.get::<f32>(Field::X, 3), 1.5);
        assert_eq!(store.ys()[3], -2.5);
        assert_eq!(store.get::<u32>(Field::TypeTag, 3), 7);
        assert_eq!(store.get::<u8>(Field::Active, 3), 1);
        // Neighboring slots untouched.
        assert_eq!(store.xs()[2], 0.0);
        assert_eq!(store.xs()[4], 0.0);
    }

    #[test]
    #[should_panic(expected = "wrong element type")]
    fn test_wrong_element_type_fails_fast() {
        let store = EntityStore::allocate(8);
        let _ = store.column::<u32>(Field::X);
    }

    #[test]
    fn test_columns_mut_split_is_disjoint_and_consistent() {
        let mut store = EntityStore::allocate(16);
        {
            let cols = store.columns_mut();
            cols.x[0] = 10.0;
            cols.y[0] = 20.0;
            cols.vx[15] = -3.0;
            cols.active[0] = 1;
            cols.type_tag[0] = 2;
            cols.on_screen[15] = 1;
            assert_eq!(cols.x.len(), 16);
            assert_eq!(cols.on_screen.len(), 16);
        }
        // The split writes land in the same storage the accessors see.
        assert_eq!(store.xs()[0], 10.0);
        assert_eq!(store.ys()[0], 20.0);
        assert_eq!(store.vxs()[15], -3.0);
        assert_eq!(store.actives()[0], 1);
        assert_eq!(store.type_tags()[0], 2);
        assert_eq!(store.on_screen_flags()[15], 1);
    }

    #[test]
    fn test_large_capacity() {
        let mut store = EntityStore::allocate(50_000);
        store.set::<f32>(Field::VisualRange, 49_999, 60.0);
        assert_eq!(store.visual_ranges()[49_999], 60.0);
    }
}
