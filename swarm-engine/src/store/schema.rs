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
//! Field schema and byte layout for columnar storage
//!
//! The schema is an ordered declaration of fields (name, element type) from
//! which both the byte layout and the per-field accessors are generated. The
//! `entity_schema!` macro emits the [`Field`] enum, the descriptor table, and
//! one typed accessor pair per field on [`EntityStore`], so every read and
//! write in the engine goes through the same generated path.
//!
//! Requesting a field with the wrong element type is a programming error and
//! panics immediately; it is never a recoverable runtime condition.

use super::EntityStore;

/// Element type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 32-bit float.
    F32,
    /// 32-bit unsigned integer.
    U32,
    /// 8-bit unsigned integer (flags).
    U8,
}

impl FieldKind {
    /// Element width in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::U8 => 1,
        }
    }

    /// Required alignment in bytes (equal to the width for these kinds).
    pub const fn align(self) -> usize {
        self.width()
    }
}

/// Descriptor for one schema field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDesc {
    /// Field name, as declared.
    pub name: &'static str,
    /// Element type.
    pub kind: FieldKind,
}

/// Element types that may back a column.
///
/// Sealed by the `Pod` bound in practice; the associated kind lets accessors
/// verify at runtime that a field is read with its declared type.
pub trait ColumnElement: bytemuck::Pod {
    /// The schema kind this element type corresponds to.
    const KIND: FieldKind;
}

impl ColumnElement for f32 {
    const KIND: FieldKind = FieldKind::F32;
}

impl ColumnElement for u32 {
    const KIND: FieldKind = FieldKind::U32;
}

impl ColumnElement for u8 {
    const KIND: FieldKind = FieldKind::U8;
}

/// Alignment-padded byte layout of a schema at a fixed capacity.
///
/// Offset of field k is the cumulative, alignment-padded size of all
/// preceding fields; every array holds exactly `capacity` elements.
#[derive(Debug, Clone)]
pub struct Layout {
    entries: Vec<(usize, usize)>, // (byte offset, element width) per field
    total_bytes: usize,
    capacity: usize,
}

impl Layout {
    /// Compute the layout for an ordered field list at the given capacity.
    pub fn compute(fields: &[FieldDesc], capacity: usize) -> Self {
        let mut offset = 0usize;
        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            let align = field.kind.align();
            offset = (offset + align - 1) / align * align;
            entries.push((offset, field.kind.width()));
            offset += field.kind.width() * capacity;
        }
        Layout {
            entries,
            total_bytes: offset,
            capacity,
        }
    }

    /// Total bytes needed for this schema at the given capacity, without
    /// allocating anything.
    pub fn buffer_size(fields: &[FieldDesc], capacity: usize) -> usize {
        Self::compute(fields, capacity).total_bytes
    }

    /// Total size of the backing block in bytes.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of elements per field array.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte offset of the field at `index` in declaration order.
    pub fn offset(&self, index: usize) -> usize {
        self.entries[index].0
    }

    /// Byte range of the field at `index`.
    pub fn byte_range(&self, index: usize) -> std::ops::Range<usize> {
        let (offset, width) = self.entries[index];
        offset..offset + width * self.capacity
    }
}

/// Declares the core schema: the `Field` enum, its descriptor table, and the
/// generated accessor pair per field on `EntityStore`.
macro_rules! entity_schema {
    ($( $(#[$doc:meta])* $variant:ident : $kind:ident / $ty:ty, $name:literal, $get:ident, $get_mut:ident );+ $(;)?) => {
        /// Identifier for a core schema field, in declaration order.
        ///
        /// The discriminant doubles as the field's index into the layout
        /// table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Field {
            $( $(#[$doc])* $variant, )+
        }

        impl Field {
            /// Number of fields in the core schema.
            pub const COUNT: usize = [$( $name ),+].len();

            /// All fields in declaration order.
            pub const ALL: [Field; Field::COUNT] = [$( Field::$variant ),+];

            /// Descriptor (name and element type) for this field.
            pub fn desc(self) -> FieldDesc {
                match self {
                    $( Field::$variant => FieldDesc {
                        name: $name,
                        kind: FieldKind::$kind,
                    }, )+
                }
            }

            /// Index of this field in declaration order.
            pub fn index(self) -> usize {
                self as usize
            }
        }

        /// Descriptor table for the core schema, in declaration order.
        pub fn core_fields() -> [FieldDesc; Field::COUNT] {
            let mut fields = [FieldDesc { name: "", kind: FieldKind::U8 }; Field::COUNT];
            let mut i = 0;
            for field in Field::ALL {
                fields[i] = field.desc();
                i += 1;
            }
            fields
        }

        impl EntityStore {
            $(
                #[doc = concat!("Column view of the `", $name, "` field.")]
                pub fn $get(&self) -> &[$ty] {
                    self.column::<$ty>(Field::$variant)
                }

                #[doc = concat!("Mutable column view of the `", $name, "` field.")]
                pub fn $get_mut(&mut self) -> &mut [$ty] {
                    self.column_mut::<$ty>(Field::$variant)
                }
            )+
        }
    };
}

entity_schema! {
    /// Position, x.
    X: F32 / f32, "x", xs, xs_mut;
    /// Position, y.
    Y: F32 / f32, "y", ys, ys_mut;
    /// Velocity, x.
    Vx: F32 / f32, "vx", vxs, vxs_mut;
    /// Velocity, y.
    Vy: F32 / f32, "vy", vys, vys_mut;
    /// Acceleration, x. Cleared by the physics phase every frame.
    Ax: F32 / f32, "ax", axs, axs_mut;
    /// Acceleration, y. Cleared by the physics phase every frame.
    Ay: F32 / f32, "ay", ays, ays_mut;
    /// Facing angle in radians, derived from velocity.
    Rotation: F32 / f32, "rotation", rotations, rotations_mut;
    /// Speed (velocity magnitude) after clamping.
    Speed: F32 / f32, "speed", speeds, speeds_mut;
    /// Per-entity speed ceiling.
    MaxVelocity: F32 / f32, "max_velocity", max_velocities, max_velocities_mut;
    /// Per-entity acceleration magnitude ceiling.
    MaxAcceleration: F32 / f32, "max_acceleration", max_accelerations, max_accelerations_mut;
    /// Per-entity speed floor.
    MinSpeed: F32 / f32, "min_speed", min_speeds, min_speeds_mut;
    /// Exponential velocity decay coefficient in [0, 1).
    Friction: F32 / f32, "friction", frictions, frictions_mut;
    /// Collision circle radius.
    Radius: F32 / f32, "radius", radii, radii_mut;
    /// Perception radius for neighbor queries.
    VisualRange: F32 / f32, "visual_range", visual_ranges, visual_ranges_mut;
    /// Registered kind id of the entity occupying this slot.
    TypeTag: U32 / u32, "type_tag", type_tags, type_tags_mut;
    /// 1 while the slot holds a live entity, 0 otherwise.
    Active: U8 / u8, "active", actives, actives_mut;
    /// 1 while the entity intersects the camera view; written by the spatial
    /// phase each frame.
    OnScreen: U8 / u8, "on_screen", on_screen_flags, on_screen_flags_mut;
}
