//! The tag-access surface shared by every primitive view, consumed by the
//! filter engine.

use std::ops::BitOr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Node,
    Way,
    Relation,
}

/// A small set of primitive types, used by the type filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PrimitiveTypeSet(u8);

impl PrimitiveTypeSet {
    pub const EMPTY: PrimitiveTypeSet = PrimitiveTypeSet(0);
    pub const NODES: PrimitiveTypeSet = PrimitiveTypeSet(1);
    pub const WAYS: PrimitiveTypeSet = PrimitiveTypeSet(1 << 1);
    pub const RELATIONS: PrimitiveTypeSet = PrimitiveTypeSet(1 << 2);
    pub const ALL: PrimitiveTypeSet = PrimitiveTypeSet(0b111);

    #[inline]
    pub fn contains(self, kind: PrimitiveType) -> bool {
        let bit = match kind {
            PrimitiveType::Node => Self::NODES,
            PrimitiveType::Way => Self::WAYS,
            PrimitiveType::Relation => Self::RELATIONS,
        };
        self.0 & bit.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PrimitiveTypeSet {
    type Output = PrimitiveTypeSet;

    fn bitor(self, rhs: PrimitiveTypeSet) -> PrimitiveTypeSet {
        PrimitiveTypeSet(self.0 | rhs.0)
    }
}

impl From<PrimitiveType> for PrimitiveTypeSet {
    fn from(kind: PrimitiveType) -> PrimitiveTypeSet {
        match kind {
            PrimitiveType::Node => PrimitiveTypeSet::NODES,
            PrimitiveType::Way => PrimitiveTypeSet::WAYS,
            PrimitiveType::Relation => PrimitiveTypeSet::RELATIONS,
        }
    }
}

/// Read access to a primitive's type and tags, by string-table id and by
/// resolved string. Id accessors return 0 for out-of-range tag indices;
/// string accessors return `""`.
pub trait Primitive {
    fn primitive_type(&self) -> PrimitiveType;

    fn tags_len(&self) -> usize;

    fn key_id(&self, index: usize) -> u32;

    fn value_id(&self, index: usize) -> u32;

    fn key(&self, index: usize) -> &str;

    fn value(&self, index: usize) -> &str;
}

/// Index of the first tag carrying `key_id`, if any. Id 0 never matches.
#[inline]
pub fn find_key<P: Primitive + ?Sized>(primitive: &P, key_id: u32) -> Option<usize> {
    if key_id == 0 {
        return None;
    }

    (0..primitive.tags_len()).find(|&i| primitive.key_id(i) == key_id)
}

/// Index of the first tag carrying exactly (`key_id`, `value_id`).
#[inline]
pub fn find_tag<P: Primitive + ?Sized>(
    primitive: &P,
    key_id: u32,
    value_id: u32,
) -> Option<usize> {
    if key_id == 0 || value_id == 0 {
        return None;
    }

    (0..primitive.tags_len())
        .find(|&i| primitive.key_id(i) == key_id && primitive.value_id(i) == value_id)
}

#[inline]
pub fn has_key<P: Primitive + ?Sized>(primitive: &P, key_id: u32) -> bool {
    find_key(primitive, key_id).is_some()
}

#[inline]
pub fn has_tag<P: Primitive + ?Sized>(primitive: &P, key_id: u32, value_id: u32) -> bool {
    find_tag(primitive, key_id, value_id).is_some()
}
