#![cfg(test)]

use regex::Regex;

use crate::filter::TagFilter;
use crate::reader::{PrimitiveReader, PrimitiveTypeSet};
use crate::writer::{NodeLayout, PrimitiveBlockBuilder};

/// One node tagged {name=X, lanes=..., maxspeed=50}, one bare way.
fn fixture_reader() -> PrimitiveReader {
    let mut builder = PrimitiveBlockBuilder::new();
    builder.push_node(
        NodeLayout::Plain,
        1,
        0,
        0,
        [("name", "X"), ("lanes", "3"), ("maxspeed", "50")],
    );
    builder.push_node(NodeLayout::Dense, 2, 0, 0, [("lanes", "03")]);
    builder.push_node(NodeLayout::Dense, 3, 0, 0, [("lanes", "3 ")]);
    builder.push_way(4, &[1], []);

    let mut buffer = Vec::new();
    assert!(builder.flush(&mut buffer));
    PrimitiveReader::from_data(&buffer)
}

#[test]
fn key_filter_matches_with_and_without_cache() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let filter = TagFilter::key("name");
    // Unassigned: string comparison path.
    assert!(filter.matches(&node));
    assert_eq!(filter.matching_tag(), Some(0));

    // Assigned: id comparison path.
    filter.assign_block(Some(&reader));
    assert!(filter.rebuild_cache());
    assert!(filter.matches(&node));

    let absent = TagFilter::key("building");
    absent.assign_block(Some(&reader));
    assert!(!absent.rebuild_cache());
    assert!(!absent.matches(&node));
}

#[test]
fn key_value_fast_reject_on_missing_string() {
    let reader = fixture_reader();
    let filter = TagFilter::key_value("highway", "primary");

    filter.assign_block(Some(&reader));
    assert!(!filter.rebuild_cache());

    for node in reader.iter_nodes() {
        assert!(!filter.matches(&node));
    }
    for way in reader.iter_ways() {
        assert!(!filter.matches(&way));
    }
}

#[test]
fn fast_reject_with_inversion_matches_everything() {
    let reader = fixture_reader();
    let filter = TagFilter::key_value("highway", "primary");
    filter.set_inverted(true);

    filter.assign_block(Some(&reader));
    assert!(!filter.rebuild_cache());

    // rebuild false means every match result equals the inverted flag.
    for node in reader.iter_nodes() {
        assert!(filter.matches(&node));
    }
}

#[test]
fn int_filter_requires_full_parse() {
    let reader = fixture_reader();
    let filter = TagFilter::int_value("lanes", 3);

    let nodes: Vec<_> = reader.iter_nodes().collect();
    // Uncached: "3" and "03" parse to 3, "3 " does not parse at all.
    assert!(filter.matches(&nodes[0]));
    assert!(filter.matches(&nodes[1]));
    assert!(!filter.matches(&nodes[2]));

    // Cached: same verdicts through the id sets.
    filter.assign_block(Some(&reader));
    assert!(filter.rebuild_cache());
    assert!(filter.matches(&nodes[0]));
    assert!(filter.matches(&nodes[1]));
    assert!(!filter.matches(&nodes[2]));
}

#[test]
fn double_inversion_is_identity() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let filter = TagFilter::key("name");
    let before = filter.matches(&node);

    assert!(filter.invert());
    assert_eq!(filter.matches(&node), !before);

    assert!(!filter.invert());
    assert_eq!(filter.matches(&node), before);
}

#[test]
fn empty_and_matches_everything_empty_or_nothing() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");
    let way = reader.iter_ways().next().expect("fixture way");

    let all = TagFilter::and(vec![]);
    let none = TagFilter::or(vec![]);

    assert!(all.matches(&node));
    assert!(all.matches(&way));
    assert!(!none.matches(&node));
    assert!(!none.matches(&way));
}

#[test]
fn composite_rebuild_aggregation() {
    let reader = fixture_reader();

    let present = TagFilter::key("name");
    let missing = TagFilter::key("building");

    let either = TagFilter::or(vec![present.copy(), missing.copy()]);
    either.assign_block(Some(&reader));
    assert!(either.rebuild_cache());

    let nothing = TagFilter::or(vec![missing.copy(), missing.copy()]);
    nothing.assign_block(Some(&reader));
    assert!(!nothing.rebuild_cache());

    let both = TagFilter::and(vec![present.copy(), missing.copy()]);
    both.assign_block(Some(&reader));
    assert!(!both.rebuild_cache());

    let satisfied = TagFilter::and(vec![present.copy(), present.copy()]);
    satisfied.assign_block(Some(&reader));
    assert!(satisfied.rebuild_cache());
}

#[test]
fn and_or_composition_matches() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let named_with_speed = TagFilter::and(vec![
        TagFilter::key("name"),
        TagFilter::key_value("maxspeed", "50"),
    ]);
    assert!(named_with_speed.matches(&node));

    let unnamed_or_fast = TagFilter::or(vec![
        TagFilter::not(TagFilter::key("name")),
        TagFilter::key_value("maxspeed", "50"),
    ]);
    assert!(unnamed_or_fast.matches(&node));
}

#[test]
fn type_filter_discriminates() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");
    let way = reader.iter_ways().next().expect("fixture way");

    let nodes_only = TagFilter::primitive_type(PrimitiveTypeSet::NODES);
    assert!(nodes_only.matches(&node));
    assert!(!nodes_only.matches(&way));

    let both = TagFilter::primitive_type(PrimitiveTypeSet::NODES | PrimitiveTypeSet::WAYS);
    assert!(both.matches(&way));

    let empty = TagFilter::primitive_type(PrimitiveTypeSet::EMPTY);
    assert!(!empty.rebuild_cache());
    assert!(!empty.matches(&node));
}

#[test]
fn constant_filter() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    assert!(TagFilter::constant(true).matches(&node));
    assert!(!TagFilter::constant(false).matches(&node));
    assert!(TagFilter::constant(true).rebuild_cache());
    assert!(!TagFilter::constant(false).rebuild_cache());
}

#[test]
fn multi_key_and_map_filters() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let any_key = TagFilter::keys(&["building", "name"]);
    assert!(any_key.matches(&node));
    any_key.assign_block(Some(&reader));
    assert!(any_key.rebuild_cache());
    assert!(any_key.matches(&node));

    let map = TagFilter::key_value_map(&[
        ("maxspeed", &["50", "60"] as &[&str]),
        ("building", &["yes"]),
    ]);
    assert!(map.matches(&node));
    map.assign_block(Some(&reader));
    assert!(map.rebuild_cache());
    assert!(map.matches(&node));

    let miss = TagFilter::key_value_map(&[("maxspeed", &["70"] as &[&str])]);
    assert!(!miss.matches(&node));
    miss.assign_block(Some(&reader));
    assert!(!miss.rebuild_cache());
    assert!(!miss.matches(&node));
}

#[test]
fn regex_filter_matches_keys() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let speedish = TagFilter::key_regex(Regex::new("^max").expect("valid pattern"));
    assert!(speedish.matches(&node));

    speedish.assign_block(Some(&reader));
    assert!(speedish.rebuild_cache());
    assert!(speedish.matches(&node));

    let none = TagFilter::key_regex(Regex::new("^addr:").expect("valid pattern"));
    none.assign_block(Some(&reader));
    assert!(!none.rebuild_cache());
    assert!(!none.matches(&node));
}

#[test]
fn bool_filter_accepts_spellings() {
    let mut builder = PrimitiveBlockBuilder::new();
    builder.push_node(NodeLayout::Plain, 1, 0, 0, [("oneway", "yes")]);
    builder.push_node(NodeLayout::Plain, 2, 0, 0, [("oneway", "0")]);
    let mut buffer = Vec::new();
    assert!(builder.flush(&mut buffer));
    let reader = PrimitiveReader::from_data(&buffer);

    let nodes: Vec<_> = reader.iter_nodes().collect();
    let yes = TagFilter::bool_value("oneway", true);
    let no = TagFilter::bool_value("oneway", false);

    assert!(yes.matches(&nodes[0]));
    assert!(!yes.matches(&nodes[1]));
    assert!(no.matches(&nodes[1]));
    assert!(!no.matches(&nodes[0]));
}

#[test]
fn reassignment_rebuilds_ids() {
    // Two blocks interning the same strings at different ids.
    let mut builder = PrimitiveBlockBuilder::new();
    builder.push_node(NodeLayout::Plain, 1, 0, 0, [("name", "X")]);
    let mut first = Vec::new();
    assert!(builder.flush(&mut first));

    builder.push_node(NodeLayout::Plain, 2, 0, 0, [("padding", "q"), ("name", "X")]);
    let mut second = Vec::new();
    assert!(builder.flush(&mut second));

    let reader_a = PrimitiveReader::from_data(&first);
    let reader_b = PrimitiveReader::from_data(&second);

    let filter = TagFilter::key_value("name", "X");
    filter.assign_block(Some(&reader_a));
    assert!(filter.rebuild_cache());
    assert!(filter.matches(&reader_a.iter_nodes().next().expect("node")));

    filter.assign_block(Some(&reader_b));
    assert!(filter.rebuild_cache());
    assert!(filter.matches(&reader_b.iter_nodes().next().expect("node")));

    // Unbinding falls back to string comparison.
    filter.assign_block(None);
    assert!(filter.rebuild_cache());
    assert!(filter.matches(&reader_a.iter_nodes().next().expect("node")));
}

#[test]
fn copy_preserves_dag_sharing() {
    let shared = TagFilter::key("name");
    let left = TagFilter::not(shared.clone());
    let right = TagFilter::and(vec![shared.clone(), TagFilter::constant(true)]);
    let root = TagFilter::or(vec![left, right]);

    let copied = root.copy();
    assert!(!std::sync::Arc::ptr_eq(&root, &copied));

    // Dig the shared child out of both parents of the copy.
    let top = copied.children();
    assert_eq!(top.len(), 2);
    let not_child = top[0].children();
    let and_children = top[1].children();

    assert!(std::sync::Arc::ptr_eq(&not_child[0], &and_children[0]));
    assert!(!std::sync::Arc::ptr_eq(&not_child[0], &shared));
}

#[test]
fn copied_tree_behaves_like_original() {
    let reader = fixture_reader();
    let node = reader.iter_nodes().next().expect("fixture node");

    let original = TagFilter::and(vec![
        TagFilter::key("name"),
        TagFilter::not(TagFilter::key("building")),
    ]);
    original.assign_block(Some(&reader));
    original.rebuild_cache();

    let copied = original.copy();
    // Copies start unassigned and still agree via the string path.
    assert_eq!(original.matches(&node), copied.matches(&node));

    copied.assign_block(Some(&reader));
    copied.rebuild_cache();
    assert_eq!(original.matches(&node), copied.matches(&node));
}
