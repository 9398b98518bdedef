//! Cursor families over a decoded block, and the ref views they hand out.
//!
//! Cursors do the positioning: `next`, `previous`, `seek`, with every
//! position outside `[0, len)` reporting null. `get()` materializes a view
//! (`NodeRef`, `WayRef`, `RelationRef`) carrying the data accessors; views
//! borrow the reader and stay valid for the block's lifetime.

use crate::model;
use crate::model::relation::MemberType;
use crate::reader::primitive::{Primitive, PrimitiveType};
use crate::reader::PrimitiveReader;

/// Tag storage of one primitive: parallel key/val arrays, or a run inside a
/// dense keys_vals stream.
#[derive(Clone, Copy)]
pub(crate) enum TagSlot<'a> {
    Fields { keys: &'a [u32], vals: &'a [u32] },
    Dense {
        dense: &'a model::DenseNodes,
        start: usize,
        count: usize,
    },
}

impl TagSlot<'_> {
    #[inline]
    fn len(&self) -> usize {
        match self {
            TagSlot::Fields { keys, .. } => keys.len(),
            TagSlot::Dense { count, .. } => *count,
        }
    }

    #[inline]
    fn key_id(&self, index: usize) -> u32 {
        match self {
            TagSlot::Fields { keys, .. } => keys.get(index).copied().unwrap_or(0),
            TagSlot::Dense { dense, start, count } => {
                if index >= *count {
                    return 0;
                }
                dense
                    .keys_vals
                    .get(start + index * 2)
                    .copied()
                    .unwrap_or(0)
                    .max(0) as u32
            }
        }
    }

    #[inline]
    fn value_id(&self, index: usize) -> u32 {
        match self {
            TagSlot::Fields { vals, .. } => vals.get(index).copied().unwrap_or(0),
            TagSlot::Dense { dense, start, count } => {
                if index >= *count {
                    return 0;
                }
                dense
                    .keys_vals
                    .get(start + index * 2 + 1)
                    .copied()
                    .unwrap_or(0)
                    .max(0) as u32
            }
        }
    }
}

/// Iterator over a view's resolved `(key, value)` tag pairs.
pub struct Tags<'a> {
    reader: &'a PrimitiveReader,
    slot: TagSlot<'a>,
    index: usize,
}

impl<'a> Iterator for Tags<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.slot.len() {
            return None;
        }

        let key = self.reader.string(self.slot.key_id(self.index));
        let value = self.reader.string(self.slot.value_id(self.index));
        self.index += 1;
        Some((key, value))
    }
}

/// The node cursor: plain-only, dense-only, or the unified sequence that
/// walks plain nodes first, then dense nodes.
///
/// Dense positions are recovered with running id/lat/lon accumulators:
/// stepping forward adds the position's delta, stepping back subtracts the
/// departed one, and the first position of each dense packet reseeds from
/// the packet's absolute head. Cold positions (after `seek`, or crossing a
/// packet boundary backwards) rebuild by a prefix scan from the packet
/// start. When the reader has unpacked dense nodes, positions read absolute
/// values directly.
pub struct NodeCursor<'a> {
    reader: &'a PrimitiveReader,
    plain_len: usize,
    dense_len: usize,
    index: i64,
    /// Position the accumulators currently describe; -1 before first load.
    accum_index: i64,
    id: i64,
    lat: i64,
    lon: i64,
}

impl<'a> NodeCursor<'a> {
    pub(crate) fn unified(reader: &'a PrimitiveReader) -> NodeCursor<'a> {
        NodeCursor::with_lens(reader, reader.plain_nodes_len(), reader.dense_nodes_len())
    }

    pub(crate) fn plain(reader: &'a PrimitiveReader) -> NodeCursor<'a> {
        NodeCursor::with_lens(reader, reader.plain_nodes_len(), 0)
    }

    pub(crate) fn dense(reader: &'a PrimitiveReader) -> NodeCursor<'a> {
        NodeCursor::with_lens(reader, 0, reader.dense_nodes_len())
    }

    fn with_lens(reader: &'a PrimitiveReader, plain_len: usize, dense_len: usize) -> Self {
        NodeCursor {
            reader,
            plain_len,
            dense_len,
            index: -1,
            accum_index: -1,
            id: 0,
            lat: 0,
            lon: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plain_len + self.dense_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.index
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.reader.is_null() || self.index < 0 || self.index >= self.len() as i64
    }

    pub fn next(&mut self) {
        self.index = (self.index + 1).min(self.len() as i64);
        self.load();
    }

    pub fn previous(&mut self) {
        self.index = (self.index - 1).max(-1);
        self.load();
    }

    pub fn seek(&mut self, position: i64) {
        self.index = position.clamp(-1, self.len() as i64);
        self.load();
    }

    fn load(&mut self) {
        if self.is_null() {
            return;
        }

        let target = self.index as usize;
        if target < self.plain_len {
            if let Some(node) = self.reader.plain_node(target) {
                self.id = node.id;
                self.lat = node.lat;
                self.lon = node.lon;
                self.accum_index = self.index;
            }
            return;
        }

        let Some(slot) = self.reader.dense_slot(target - self.plain_len) else {
            return;
        };
        let dense = slot.dense;

        if self.reader.dense_unpacked() {
            self.id = dense.id[slot.local];
            self.lat = dense.lat[slot.local];
            self.lon = dense.lon[slot.local];
            self.accum_index = self.index;
            return;
        }

        if self.accum_index == self.index {
            return;
        }

        // Forward step inside the packet: add this position's delta.
        if self.accum_index >= 0 && self.accum_index + 1 == self.index && slot.local > 0 {
            self.id += dense.id[slot.local];
            self.lat += dense.lat[slot.local];
            self.lon += dense.lon[slot.local];
            self.accum_index = self.index;
            return;
        }

        // Backward step inside the packet: drop the departed delta.
        if self.accum_index == self.index + 1 && slot.local + 1 < dense.id.len() {
            self.id -= dense.id[slot.local + 1];
            self.lat -= dense.lat[slot.local + 1];
            self.lon -= dense.lon[slot.local + 1];
            self.accum_index = self.index;
            return;
        }

        // Cold position: rebuild from the packet head.
        let (mut id, mut lat, mut lon) = (0_i64, 0_i64, 0_i64);
        for k in 0..=slot.local {
            id += dense.id[k];
            lat += dense.lat[k];
            lon += dense.lon[k];
        }
        self.id = id;
        self.lat = lat;
        self.lon = lon;
        self.accum_index = self.index;
    }

    pub fn get(&self) -> Option<NodeRef<'a>> {
        if self.is_null() {
            return None;
        }

        let target = self.index as usize;
        let tags = if target < self.plain_len {
            let node = self.reader.plain_node(target)?;
            TagSlot::Fields {
                keys: &node.keys,
                vals: &node.vals,
            }
        } else {
            let slot = self.reader.dense_slot(target - self.plain_len)?;
            let (start, count) = self.reader.dense_tag_range(slot.span, slot.local);
            TagSlot::Dense {
                dense: slot.dense,
                start,
                count,
            }
        };

        Some(NodeRef {
            reader: self.reader,
            id: self.id,
            lat: self.lat,
            lon: self.lon,
            tags,
        })
    }
}

/// One node: identity, raw and converted coordinates, tags.
pub struct NodeRef<'a> {
    reader: &'a PrimitiveReader,
    id: i64,
    lat: i64,
    lon: i64,
    tags: TagSlot<'a>,
}

impl<'a> NodeRef<'a> {
    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Latitude in stored coordinate units.
    #[inline]
    pub fn raw_lat(&self) -> i64 {
        self.lat
    }

    #[inline]
    pub fn raw_lon(&self) -> i64 {
        self.lon
    }

    /// Latitude in WGS84 nanodegrees.
    #[inline]
    pub fn nano_lat(&self) -> i64 {
        self.reader.nano_lat(self.lat)
    }

    #[inline]
    pub fn nano_lon(&self) -> i64 {
        self.reader.nano_lon(self.lon)
    }

    /// Latitude in WGS84 degrees.
    #[inline]
    pub fn lat(&self) -> f64 {
        self.nano_lat() as f64 * 1e-9
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.nano_lon() as f64 * 1e-9
    }

    pub fn tags(&self) -> Tags<'a> {
        Tags {
            reader: self.reader,
            slot: self.tags,
            index: 0,
        }
    }
}

impl Primitive for NodeRef<'_> {
    fn primitive_type(&self) -> PrimitiveType {
        PrimitiveType::Node
    }

    fn tags_len(&self) -> usize {
        self.tags.len()
    }

    fn key_id(&self, index: usize) -> u32 {
        self.tags.key_id(index)
    }

    fn value_id(&self, index: usize) -> u32 {
        self.tags.value_id(index)
    }

    fn key(&self, index: usize) -> &str {
        self.reader.string(self.tags.key_id(index))
    }

    fn value(&self, index: usize) -> &str {
        self.reader.string(self.tags.value_id(index))
    }
}

/// Prefix-sum iterator over a way's delta-coded refs.
pub struct RefIds<'a> {
    deltas: std::slice::Iter<'a, i64>,
    current: i64,
}

impl Iterator for RefIds<'_> {
    type Item = i64;

    #[inline]
    fn next(&mut self) -> Option<i64> {
        let delta = self.deltas.next()?;
        self.current += delta;
        Some(self.current)
    }
}

pub struct WayCursor<'a> {
    reader: &'a PrimitiveReader,
    len: usize,
    index: i64,
}

impl<'a> WayCursor<'a> {
    pub(crate) fn new(reader: &'a PrimitiveReader) -> WayCursor<'a> {
        WayCursor {
            reader,
            len: reader.ways_len(),
            index: -1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.index
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.reader.is_null() || self.index < 0 || self.index >= self.len as i64
    }

    pub fn next(&mut self) {
        self.index = (self.index + 1).min(self.len as i64);
    }

    pub fn previous(&mut self) {
        self.index = (self.index - 1).max(-1);
    }

    pub fn seek(&mut self, position: i64) {
        self.index = position.clamp(-1, self.len as i64);
    }

    pub fn get(&self) -> Option<WayRef<'a>> {
        if self.is_null() {
            return None;
        }

        self.reader
            .way(self.index as usize)
            .map(|way| WayRef {
                reader: self.reader,
                way,
            })
    }
}

pub struct WayRef<'a> {
    reader: &'a PrimitiveReader,
    way: &'a model::Way,
}

impl<'a> WayRef<'a> {
    #[inline]
    pub fn id(&self) -> i64 {
        self.way.id
    }

    #[inline]
    pub fn refs_len(&self) -> usize {
        self.way.refs.len()
    }

    /// The stored delta at `index`.
    #[inline]
    pub fn raw_ref(&self, index: usize) -> i64 {
        self.way.refs.get(index).copied().unwrap_or(0)
    }

    /// Absolute node id at `index`. O(index), convenience only; iterate
    /// `refs()` instead of calling this in a loop.
    pub fn ref_at(&self, index: usize) -> i64 {
        self.way.refs.iter().take(index + 1).sum()
    }

    /// Absolute node ids, in way order.
    pub fn refs(&self) -> RefIds<'a> {
        RefIds {
            deltas: self.way.refs.iter(),
            current: 0,
        }
    }

    pub fn tags(&self) -> Tags<'a> {
        Tags {
            reader: self.reader,
            slot: TagSlot::Fields {
                keys: &self.way.keys,
                vals: &self.way.vals,
            },
            index: 0,
        }
    }
}

impl Primitive for WayRef<'_> {
    fn primitive_type(&self) -> PrimitiveType {
        PrimitiveType::Way
    }

    fn tags_len(&self) -> usize {
        self.way.keys.len()
    }

    fn key_id(&self, index: usize) -> u32 {
        self.way.keys.get(index).copied().unwrap_or(0)
    }

    fn value_id(&self, index: usize) -> u32 {
        self.way.vals.get(index).copied().unwrap_or(0)
    }

    fn key(&self, index: usize) -> &str {
        self.reader.string(self.key_id(index))
    }

    fn value(&self, index: usize) -> &str {
        self.reader.string(self.value_id(index))
    }
}

/// One resolved relation member.
pub struct Member<'a> {
    pub id: i64,
    pub member_type: MemberType,
    pub role: &'a str,
}

/// Prefix-sum iterator over a relation's members.
pub struct Members<'a> {
    reader: &'a PrimitiveReader,
    relation: &'a model::Relation,
    index: usize,
    current: i64,
}

impl<'a> Iterator for Members<'a> {
    type Item = Member<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let delta = self.relation.memids.get(self.index).copied()?;
        self.current += delta;

        let member_type = self
            .relation
            .types
            .get(self.index)
            .copied()
            .and_then(|raw| MemberType::try_from(raw).ok())
            .unwrap_or(MemberType::Node);
        let role = self.reader.string(
            self.relation
                .roles_sid
                .get(self.index)
                .copied()
                .unwrap_or(0),
        );

        self.index += 1;
        Some(Member {
            id: self.current,
            member_type,
            role,
        })
    }
}

pub struct RelationCursor<'a> {
    reader: &'a PrimitiveReader,
    len: usize,
    index: i64,
}

impl<'a> RelationCursor<'a> {
    pub(crate) fn new(reader: &'a PrimitiveReader) -> RelationCursor<'a> {
        RelationCursor {
            reader,
            len: reader.relations_len(),
            index: -1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.index
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.reader.is_null() || self.index < 0 || self.index >= self.len as i64
    }

    pub fn next(&mut self) {
        self.index = (self.index + 1).min(self.len as i64);
    }

    pub fn previous(&mut self) {
        self.index = (self.index - 1).max(-1);
    }

    pub fn seek(&mut self, position: i64) {
        self.index = position.clamp(-1, self.len as i64);
    }

    pub fn get(&self) -> Option<RelationRef<'a>> {
        if self.is_null() {
            return None;
        }

        self.reader
            .relation(self.index as usize)
            .map(|relation| RelationRef {
                reader: self.reader,
                relation,
            })
    }
}

pub struct RelationRef<'a> {
    reader: &'a PrimitiveReader,
    relation: &'a model::Relation,
}

impl<'a> RelationRef<'a> {
    #[inline]
    pub fn id(&self) -> i64 {
        self.relation.id
    }

    #[inline]
    pub fn members_len(&self) -> usize {
        self.relation.memids.len()
    }

    /// The stored member-id delta at `index`.
    #[inline]
    pub fn raw_memid(&self, index: usize) -> i64 {
        self.relation.memids.get(index).copied().unwrap_or(0)
    }

    /// Resolved member at `index`. O(index); iterate `members()` instead of
    /// calling this in a loop.
    pub fn member(&self, index: usize) -> Option<Member<'a>> {
        if index >= self.members_len() {
            return None;
        }
        self.members().nth(index)
    }

    pub fn members(&self) -> Members<'a> {
        Members {
            reader: self.reader,
            relation: self.relation,
            index: 0,
            current: 0,
        }
    }

    pub fn tags(&self) -> Tags<'a> {
        Tags {
            reader: self.reader,
            slot: TagSlot::Fields {
                keys: &self.relation.keys,
                vals: &self.relation.vals,
            },
            index: 0,
        }
    }
}

impl Primitive for RelationRef<'_> {
    fn primitive_type(&self) -> PrimitiveType {
        PrimitiveType::Relation
    }

    fn tags_len(&self) -> usize {
        self.relation.keys.len()
    }

    fn key_id(&self, index: usize) -> u32 {
        self.relation.keys.get(index).copied().unwrap_or(0)
    }

    fn value_id(&self, index: usize) -> u32 {
        self.relation.vals.get(index).copied().unwrap_or(0)
    }

    fn key(&self, index: usize) -> &str {
        self.reader.string(self.key_id(index))
    }

    fn value(&self, index: usize) -> &str {
        self.reader.string(self.value_id(index))
    }
}

pub struct NodeIter<'a> {
    cursor: NodeCursor<'a>,
}

impl<'a> NodeIter<'a> {
    pub(crate) fn new(cursor: NodeCursor<'a>) -> NodeIter<'a> {
        NodeIter { cursor }
    }
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next();
        self.cursor.get()
    }
}

pub struct WayIter<'a> {
    cursor: WayCursor<'a>,
}

impl<'a> WayIter<'a> {
    pub(crate) fn new(cursor: WayCursor<'a>) -> WayIter<'a> {
        WayIter { cursor }
    }
}

impl<'a> Iterator for WayIter<'a> {
    type Item = WayRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next();
        self.cursor.get()
    }
}

pub struct RelationIter<'a> {
    cursor: RelationCursor<'a>,
}

impl<'a> RelationIter<'a> {
    pub(crate) fn new(cursor: RelationCursor<'a>) -> RelationIter<'a> {
        RelationIter { cursor }
    }
}

impl<'a> Iterator for RelationIter<'a> {
    type Item = RelationRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next();
        self.cursor.get()
    }
}
