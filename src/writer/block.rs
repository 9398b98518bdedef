//! The primitive block encoder.
//!
//! Primitives accumulate in per-kind groups with absolute coordinates and
//! interned tag ids; `flush` performs the storage transform, cleanup and
//! delta encoding in one pass, serializes the block, and resets.

use prost::Message;

use crate::model;
use crate::model::relation::MemberType;
use crate::writer::delta::{clean_tags, delta_encode, delta_encode_clean};
use crate::writer::string_table::StringTableBuilder;

/// Which encoding a pushed node is destined for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeLayout {
    Plain,
    Dense,
}

/// One member of a relation being pushed.
pub struct RelationMember<'a> {
    pub id: i64,
    pub member_type: MemberType,
    pub role: &'a str,
}

pub struct PrimitiveBlockBuilder {
    table: StringTableBuilder,
    block: model::PrimitiveBlock,
    plain_group: Option<usize>,
    dense_group: Option<usize>,
    ways_group: Option<usize>,
    relations_group: Option<usize>,
}

impl Default for PrimitiveBlockBuilder {
    fn default() -> Self {
        PrimitiveBlockBuilder::new()
    }
}

impl PrimitiveBlockBuilder {
    pub fn new() -> PrimitiveBlockBuilder {
        PrimitiveBlockBuilder {
            table: StringTableBuilder::new(),
            block: model::PrimitiveBlock::default(),
            plain_group: None,
            dense_group: None,
            ways_group: None,
            relations_group: None,
        }
    }

    /// Nanodegrees per stored coordinate unit; unset blocks flush with the
    /// format default of 100.
    pub fn set_granularity(&mut self, value: i32) {
        self.block.granularity = Some(value);
    }

    pub fn set_lat_offset(&mut self, nanodegrees: i64) {
        self.block.lat_offset = Some(nanodegrees);
    }

    pub fn set_lon_offset(&mut self, nanodegrees: i64) {
        self.block.lon_offset = Some(nanodegrees);
    }

    /// True once any primitive group exists; `flush` refuses otherwise.
    pub fn is_initialized(&self) -> bool {
        self.plain_group.is_some()
            || self.dense_group.is_some()
            || self.ways_group.is_some()
            || self.relations_group.is_some()
    }

    pub fn nodes_len(&self, layout: NodeLayout) -> usize {
        let slot = match layout {
            NodeLayout::Plain => self.plain_group,
            NodeLayout::Dense => self.dense_group,
        };
        slot.map_or(0, |index| self.block.primitivegroup[index].nodes.len())
    }

    pub fn ways_len(&self) -> usize {
        self.ways_group
            .map_or(0, |index| self.block.primitivegroup[index].ways.len())
    }

    pub fn relations_len(&self) -> usize {
        self.relations_group
            .map_or(0, |index| self.block.primitivegroup[index].relations.len())
    }

    /// Accepts a node with WGS84 nanodegree coordinates. Tag strings are
    /// interned immediately; an empty key interns to 0 and the pair is
    /// dropped at flush.
    pub fn push_node<'t>(
        &mut self,
        layout: NodeLayout,
        id: i64,
        nano_lat: i64,
        nano_lon: i64,
        tags: impl IntoIterator<Item = (&'t str, &'t str)>,
    ) {
        let mut node = model::Node {
            id,
            lat: nano_lat,
            lon: nano_lon,
            ..Default::default()
        };
        for (key, value) in tags {
            node.keys.push(self.table.intern(key));
            node.vals.push(self.table.intern(value));
        }

        let slot = match layout {
            NodeLayout::Plain => &mut self.plain_group,
            NodeLayout::Dense => &mut self.dense_group,
        };
        group_at(&mut self.block, slot).nodes.push(node);
    }

    /// Accepts a way with absolute node refs. Refs equal to -1 mark removed
    /// entries and are dropped at flush.
    pub fn push_way<'t>(
        &mut self,
        id: i64,
        refs: &[i64],
        tags: impl IntoIterator<Item = (&'t str, &'t str)>,
    ) {
        let mut way = model::Way {
            id,
            refs: refs.to_vec(),
            ..Default::default()
        };
        for (key, value) in tags {
            way.keys.push(self.table.intern(key));
            way.vals.push(self.table.intern(value));
        }

        group_at(&mut self.block, &mut self.ways_group).ways.push(way);
    }

    pub fn push_relation<'t>(
        &mut self,
        id: i64,
        members: &[RelationMember],
        tags: impl IntoIterator<Item = (&'t str, &'t str)>,
    ) {
        let mut relation = model::Relation {
            id,
            ..Default::default()
        };
        for member in members {
            relation.memids.push(member.id);
            relation.types.push(member.member_type as i32);
            relation.roles_sid.push(self.table.intern(member.role));
        }
        for (key, value) in tags {
            relation.keys.push(self.table.intern(key));
            relation.vals.push(self.table.intern(value));
        }

        group_at(&mut self.block, &mut self.relations_group)
            .relations
            .push(relation);
    }

    /// Serializes the accumulated block into `buffer` and resets the
    /// builder. Returns false, writing nothing, when no primitive group was
    /// ever created.
    pub fn flush(&mut self, buffer: &mut Vec<u8>) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let (wire_table, remap) = self.table.finalize();
        self.block.stringtable = wire_table;

        let granularity = self.block.granularity() as i64;
        let lat_offset = self.block.lat_offset();
        // TODO: cross-check offset defaults against other producers; both
        // fall back to 0 here.
        let lon_offset = self.block.lon_offset();

        if let Some(index) = self.plain_group {
            prepare_nodes(
                &mut self.block.primitivegroup[index],
                granularity,
                lat_offset,
                lon_offset,
                &remap,
            );
        }

        if let Some(index) = self.dense_group {
            let group = &mut self.block.primitivegroup[index];
            prepare_nodes(group, granularity, lat_offset, lon_offset, &remap);

            let mut dense = model::DenseNodes::default();
            let (mut prev_id, mut prev_lat, mut prev_lon) = (0_i64, 0_i64, 0_i64);
            for node in &group.nodes {
                dense.id.push(node.id - prev_id);
                dense.lat.push(node.lat - prev_lat);
                dense.lon.push(node.lon - prev_lon);
                prev_id = node.id;
                prev_lat = node.lat;
                prev_lon = node.lon;

                for (key, value) in node.keys.iter().zip(&node.vals) {
                    dense.keys_vals.push(*key as i32);
                    dense.keys_vals.push(*value as i32);
                }
                dense.keys_vals.push(0);
            }

            group.dense = Some(dense);
            group.nodes.clear();
        }

        if let Some(index) = self.ways_group {
            for way in &mut self.block.primitivegroup[index].ways {
                delta_encode_clean(&mut way.refs, -1);
                clean_and_remap(&mut way.keys, &mut way.vals, &remap);
            }
        }

        if let Some(index) = self.relations_group {
            for relation in &mut self.block.primitivegroup[index].relations {
                // memids stay parallel with types/roles_sid, no cleaning.
                delta_encode(&mut relation.memids);
                for sid in &mut relation.roles_sid {
                    *sid = remap.get(*sid as usize).copied().unwrap_or(0);
                }
                clean_and_remap(&mut relation.keys, &mut relation.vals, &remap);
            }
        }

        buffer.clear();
        if self.block.encode(buffer).is_err() {
            return false;
        }

        self.block = model::PrimitiveBlock::default();
        self.plain_group = None;
        self.dense_group = None;
        self.ways_group = None;
        self.relations_group = None;

        true
    }
}

fn group_at<'b>(
    block: &'b mut model::PrimitiveBlock,
    slot: &mut Option<usize>,
) -> &'b mut model::PrimitiveGroup {
    let index = match slot {
        Some(index) => *index,
        None => {
            block.primitivegroup.push(model::PrimitiveGroup::default());
            let index = block.primitivegroup.len() - 1;
            *slot = Some(index);
            index
        }
    };

    &mut block.primitivegroup[index]
}

/// Nanodegrees to storage units, then tag cleanup and id remapping.
fn prepare_nodes(
    group: &mut model::PrimitiveGroup,
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
    remap: &[u32],
) {
    for node in &mut group.nodes {
        node.lat = (node.lat - lat_offset) / granularity;
        node.lon = (node.lon - lon_offset) / granularity;
        clean_and_remap(&mut node.keys, &mut node.vals, remap);
    }
}

fn clean_and_remap(keys: &mut Vec<u32>, vals: &mut Vec<u32>, remap: &[u32]) {
    clean_tags(keys, vals);
    for id in keys.iter_mut().chain(vals.iter_mut()) {
        *id = remap.get(*id as usize).copied().unwrap_or(0);
    }
}
