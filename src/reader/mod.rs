//! Decoded-block access: the primitive reader and its cursor families

pub mod cursor;
pub mod primitive;
pub mod string_table;


#[doc(inline)]
pub use cursor::{
    Member, NodeCursor, NodeRef, RelationCursor, RelationRef, WayCursor, WayRef,
};
#[doc(inline)]
pub use primitive::{Primitive, PrimitiveType, PrimitiveTypeSet};
#[doc(inline)]
pub use string_table::StringTableReader;

use std::cell::OnceCell;
use std::sync::Arc;

use itertools::izip;
use prost::Message;

use crate::model::{DenseNodes, PrimitiveBlock};

/// A contiguous run of one primitive kind inside one group.
#[derive(Clone, Copy)]
struct GroupSpan {
    group: usize,
    len: usize,
}

pub(crate) struct DenseSlot<'a> {
    pub dense: &'a DenseNodes,
    pub span: usize,
    pub local: usize,
}

/// View over one decoded primitive block.
///
/// Owns the decoded message tree for the block's lifetime; cursors and refs
/// borrow from it. A reader built from malformed input (undecodable bytes,
/// unequal parallel arrays, dense sentinel count not matching the node
/// count) is permanently null: every size reads 0 and every lookup is
/// empty.
pub struct PrimitiveReader {
    block: PrimitiveBlock,
    table: Arc<StringTableReader>,
    plain_spans: Vec<GroupSpan>,
    dense_spans: Vec<GroupSpan>,
    way_spans: Vec<GroupSpan>,
    relation_spans: Vec<GroupSpan>,
    /// Per dense span: `[start, count]` pairs per node, built lazily by one
    /// sentinel-counting scan over `keys_vals`.
    dense_tag_index: OnceCell<Vec<Vec<u32>>>,
    dense_unpacked: bool,
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
    null: bool,
}

impl PrimitiveReader {
    pub fn from_block(mut block: PrimitiveBlock) -> PrimitiveReader {
        let valid = validate(&block);
        let table = Arc::new(StringTableReader::new(std::mem::take(
            &mut block.stringtable.s,
        )));

        let mut reader = PrimitiveReader {
            granularity: block.granularity() as i64,
            lat_offset: block.lat_offset(),
            lon_offset: block.lon_offset(),
            table,
            plain_spans: Vec::new(),
            dense_spans: Vec::new(),
            way_spans: Vec::new(),
            relation_spans: Vec::new(),
            dense_tag_index: OnceCell::new(),
            dense_unpacked: false,
            null: !valid,
            block,
        };

        if valid {
            for (group_index, group) in reader.block.primitivegroup.iter().enumerate() {
                if !group.nodes.is_empty() {
                    reader.plain_spans.push(GroupSpan {
                        group: group_index,
                        len: group.nodes.len(),
                    });
                }
                if let Some(dense) = &group.dense {
                    if !dense.id.is_empty() {
                        reader.dense_spans.push(GroupSpan {
                            group: group_index,
                            len: dense.id.len(),
                        });
                    }
                }
                if !group.ways.is_empty() {
                    reader.way_spans.push(GroupSpan {
                        group: group_index,
                        len: group.ways.len(),
                    });
                }
                if !group.relations.is_empty() {
                    reader.relation_spans.push(GroupSpan {
                        group: group_index,
                        len: group.relations.len(),
                    });
                }
            }
        }

        reader
    }

    /// Decodes `data` as a `PrimitiveBlock`; undecodable input yields a
    /// null reader rather than an error.
    pub fn from_data(data: &[u8]) -> PrimitiveReader {
        match PrimitiveBlock::decode(data) {
            Ok(block) => PrimitiveReader::from_block(block),
            Err(_) => PrimitiveReader::null(),
        }
    }

    /// The permanently empty reader.
    pub fn null() -> PrimitiveReader {
        PrimitiveReader {
            block: PrimitiveBlock::default(),
            table: Arc::new(StringTableReader::empty()),
            plain_spans: Vec::new(),
            dense_spans: Vec::new(),
            way_spans: Vec::new(),
            relation_spans: Vec::new(),
            dense_tag_index: OnceCell::new(),
            dense_unpacked: false,
            granularity: 100,
            lat_offset: 0,
            lon_offset: 0,
            null: true,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.null
    }

    #[inline]
    pub fn string_table(&self) -> &StringTableReader {
        &self.table
    }

    /// Shared handle to the table; what assigned filters hold on to.
    #[inline]
    pub fn shared_string_table(&self) -> Arc<StringTableReader> {
        Arc::clone(&self.table)
    }

    #[inline]
    pub fn string(&self, id: u32) -> &str {
        self.table.get(id)
    }

    #[inline]
    pub fn granularity(&self) -> i64 {
        self.granularity
    }

    #[inline]
    pub fn lat_offset(&self) -> i64 {
        self.lat_offset
    }

    #[inline]
    pub fn lon_offset(&self) -> i64 {
        self.lon_offset
    }

    /// Raw stored latitude to WGS84 nanodegrees.
    #[inline]
    pub fn nano_lat(&self, raw: i64) -> i64 {
        raw * self.granularity + self.lat_offset
    }

    /// Raw stored longitude to WGS84 nanodegrees.
    #[inline]
    pub fn nano_lon(&self, raw: i64) -> i64 {
        raw * self.granularity + self.lon_offset
    }

    #[inline]
    pub fn plain_nodes_len(&self) -> usize {
        self.plain_spans.iter().map(|s| s.len).sum()
    }

    #[inline]
    pub fn dense_nodes_len(&self) -> usize {
        self.dense_spans.iter().map(|s| s.len).sum()
    }

    /// Plain and dense nodes combined.
    #[inline]
    pub fn nodes_len(&self) -> usize {
        self.plain_nodes_len() + self.dense_nodes_len()
    }

    #[inline]
    pub fn ways_len(&self) -> usize {
        self.way_spans.iter().map(|s| s.len).sum()
    }

    #[inline]
    pub fn relations_len(&self) -> usize {
        self.relation_spans.iter().map(|s| s.len).sum()
    }

    /// Whether dense coordinates have been materialized to absolutes.
    #[inline]
    pub fn dense_unpacked(&self) -> bool {
        self.dense_unpacked
    }

    /// Prefix-sums every dense packet in place, so dense positions read
    /// absolute id/lat/lon without accumulator arithmetic.
    pub fn unpack_dense_nodes(&mut self) {
        if self.dense_unpacked {
            return;
        }

        for span in &self.dense_spans {
            let Some(dense) = self.block.primitivegroup[span.group].dense.as_mut() else {
                continue;
            };

            let (mut id, mut lat, mut lon) = (0_i64, 0_i64, 0_i64);
            for (i, la, lo) in izip!(&mut dense.id, &mut dense.lat, &mut dense.lon) {
                id += *i;
                lat += *la;
                lon += *lo;
                *i = id;
                *la = lat;
                *lo = lon;
            }
        }

        self.dense_unpacked = true;
    }

    pub(crate) fn plain_node(&self, index: usize) -> Option<&crate::model::Node> {
        let (span, local) = locate(&self.plain_spans, index)?;
        self.block.primitivegroup[span.group].nodes.get(local)
    }

    pub(crate) fn dense_slot(&self, index: usize) -> Option<DenseSlot<'_>> {
        let mut remaining = index;
        for (span_index, span) in self.dense_spans.iter().enumerate() {
            if remaining < span.len {
                let dense = self.block.primitivegroup[span.group].dense.as_ref()?;
                return Some(DenseSlot {
                    dense,
                    span: span_index,
                    local: remaining,
                });
            }
            remaining -= span.len;
        }
        None
    }

    pub(crate) fn way(&self, index: usize) -> Option<&crate::model::Way> {
        let (span, local) = locate(&self.way_spans, index)?;
        self.block.primitivegroup[span.group].ways.get(local)
    }

    pub(crate) fn relation(&self, index: usize) -> Option<&crate::model::Relation> {
        let (span, local) = locate(&self.relation_spans, index)?;
        self.block.primitivegroup[span.group].relations.get(local)
    }

    /// `(start, count)` of the keys_vals run belonging to one dense node.
    /// O(1) after the index is built.
    pub(crate) fn dense_tag_range(&self, span: usize, local: usize) -> (usize, usize) {
        let index = self.dense_tag_index.get_or_init(|| {
            self.dense_spans
                .iter()
                .map(|span| {
                    self.block.primitivegroup[span.group]
                        .dense
                        .as_ref()
                        .map_or_else(Vec::new, build_dense_tag_index)
                })
                .collect()
        });

        let Some(per_span) = index.get(span) else {
            return (0, 0);
        };
        // `index >= len` positions read as tagless.
        if local * 2 + 1 >= per_span.len() {
            return (0, 0);
        }

        (per_span[local * 2] as usize, per_span[local * 2 + 1] as usize)
    }

    /// The decoder-level cursors. `nodes()` walks plain nodes first, then
    /// dense nodes, as one sequence.
    pub fn nodes(&self) -> NodeCursor<'_> {
        NodeCursor::unified(self)
    }

    pub fn plain_nodes(&self) -> NodeCursor<'_> {
        NodeCursor::plain(self)
    }

    pub fn dense_nodes(&self) -> NodeCursor<'_> {
        NodeCursor::dense(self)
    }

    pub fn ways(&self) -> WayCursor<'_> {
        WayCursor::new(self)
    }

    pub fn relations(&self) -> RelationCursor<'_> {
        RelationCursor::new(self)
    }

    pub fn iter_nodes(&self) -> cursor::NodeIter<'_> {
        cursor::NodeIter::new(self.nodes())
    }

    pub fn iter_plain_nodes(&self) -> cursor::NodeIter<'_> {
        cursor::NodeIter::new(self.plain_nodes())
    }

    pub fn iter_dense_nodes(&self) -> cursor::NodeIter<'_> {
        cursor::NodeIter::new(self.dense_nodes())
    }

    pub fn iter_ways(&self) -> cursor::WayIter<'_> {
        cursor::WayIter::new(self.ways())
    }

    pub fn iter_relations(&self) -> cursor::RelationIter<'_> {
        cursor::RelationIter::new(self.relations())
    }
}

fn locate(spans: &[GroupSpan], index: usize) -> Option<(GroupSpan, usize)> {
    let mut remaining = index;
    for span in spans {
        if remaining < span.len {
            return Some((*span, remaining));
        }
        remaining -= span.len;
    }
    None
}

/// One linear scan: each node's run starts where the previous sentinel
/// ended; the pair count is the number of entries before the next sentinel.
fn build_dense_tag_index(dense: &DenseNodes) -> Vec<u32> {
    let kv = &dense.keys_vals;
    if kv.is_empty() {
        return Vec::new();
    }

    let mut index = Vec::with_capacity(dense.id.len() * 2);
    let mut pos = 0_usize;

    while pos < kv.len() {
        let start = pos;
        let mut count = 0_u32;
        while pos < kv.len() && kv[pos] != 0 {
            pos += 2;
            count += 1;
        }
        pos += 1;

        index.push(start as u32);
        index.push(count);
    }

    index
}

/// Structural checks a block must pass before any cursor runs: parallel
/// arrays of equal length, and one dense sentinel per dense node (or no
/// keys_vals at all).
fn validate(block: &PrimitiveBlock) -> bool {
    for group in &block.primitivegroup {
        for node in &group.nodes {
            if node.keys.len() != node.vals.len() {
                return false;
            }
        }

        if let Some(dense) = &group.dense {
            if dense.lat.len() != dense.id.len() || dense.lon.len() != dense.id.len() {
                return false;
            }
            if !dense.keys_vals.is_empty() {
                let sentinels = dense.keys_vals.iter().filter(|&&v| v == 0).count();
                if sentinels != dense.id.len() {
                    return false;
                }
            }
        }

        for way in &group.ways {
            if way.keys.len() != way.vals.len() {
                return false;
            }
        }

        for relation in &group.relations {
            if relation.keys.len() != relation.vals.len()
                || relation.memids.len() != relation.types.len()
                || relation.memids.len() != relation.roles_sid.len()
            {
                return false;
            }
        }
    }

    true
}
