#![cfg(test)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::block::{BlockItem, BlockIterator};
use crate::error::CodecError;
use crate::file::{BlobEncoding, OsmFileIn, OsmFileOut};
use crate::filter::TagFilter;
use crate::parallel::{
    parse_fork_join, parse_parallel, parse_reduce, parse_sequential, CancelToken,
};
use crate::writer::{NodeLayout, PrimitiveBlockBuilder};

const BLOCKS: usize = 5;
const NODES_PER_BLOCK: i64 = 100;

fn write_fixture(encoding: BlobEncoding) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("fixture.osm.pbf");

    let mut out = OsmFileOut::create(&path, encoding).expect("create file");
    out.write_header(&OsmFileOut::default_header())
        .expect("write header");

    let mut builder = PrimitiveBlockBuilder::new();
    for block in 0..BLOCKS {
        for n in 0..NODES_PER_BLOCK {
            let id = block as i64 * NODES_PER_BLOCK + n;
            builder.push_node(
                NodeLayout::Dense,
                id,
                id * 1_000,
                -id * 500,
                [("fixture", "yes")],
            );
        }
        assert!(out.write_block(&mut builder).expect("write block"));
    }
    out.finish().expect("finish");

    (dir, path)
}

fn expected_id_sum() -> i64 {
    (0..BLOCKS as i64 * NODES_PER_BLOCK).sum()
}

#[test_log::test]
fn sequential_parse_sums_ids() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let mut file = OsmFileIn::open(&path).expect("open");
    assert!(file
        .header()
        .required_features
        .iter()
        .any(|feature| feature == "DenseNodes"));

    let mut sum = 0_i64;
    parse_sequential(&mut file, &CancelToken::new(), |reader| {
        sum += reader.iter_nodes().map(|n| n.id()).sum::<i64>();
    })
    .expect("sequential parse");

    assert_eq!(sum, expected_id_sum());
}

#[test_log::test]
fn worker_pool_matches_sequential() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);

    for threads in [1, 2, 4] {
        let file = OsmFileIn::open(&path).expect("open");
        let sum = AtomicI64::new(0);

        parse_parallel(file, threads, 2, &CancelToken::new(), |reader| {
            let block_sum: i64 = reader.iter_nodes().map(|n| n.id()).sum();
            sum.fetch_add(block_sum, Ordering::Relaxed);
        })
        .expect("worker-pool parse");

        assert_eq!(sum.into_inner(), expected_id_sum(), "threads={threads}");
    }
}

#[test]
fn fork_join_matches_sequential() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let mut file = OsmFileIn::open(&path).expect("open");
    let sum = AtomicI64::new(0);

    parse_fork_join(&mut file, 3, &CancelToken::new(), |reader| {
        let block_sum: i64 = reader.iter_nodes().map(|n| n.id()).sum();
        sum.fetch_add(block_sum, Ordering::Relaxed);
    })
    .expect("fork-join parse");

    assert_eq!(sum.into_inner(), expected_id_sum());
}

#[test]
fn reduce_matches_sequential() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let file = OsmFileIn::open(&path).expect("open");

    let sum = parse_reduce(
        file,
        4,
        2,
        &CancelToken::new(),
        |reader| reader.iter_nodes().map(|n| n.id()).sum::<i64>(),
        |a, b| a + b,
        || 0_i64,
    )
    .expect("reduce parse");

    assert_eq!(sum, expected_id_sum());
}

#[test]
fn raw_encoding_round_trips() {
    let (_dir, path) = write_fixture(BlobEncoding::Raw);
    let mut file = OsmFileIn::open(&path).expect("open");

    let mut nodes = 0_usize;
    parse_sequential(&mut file, &CancelToken::new(), |reader| {
        nodes += reader.nodes_len();
    })
    .expect("sequential parse");

    assert_eq!(nodes, BLOCKS * NODES_PER_BLOCK as usize);
}

#[test]
fn coordinates_survive_the_file_round_trip() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let mut file = OsmFileIn::open(&path).expect("open");

    let reader = file
        .parse_next_block()
        .expect("read block")
        .expect("file has blocks");
    let node = reader.iter_nodes().nth(3).expect("fourth node");

    assert_eq!(node.id(), 3);
    assert_eq!(node.nano_lat(), 3_000);
    assert_eq!(node.nano_lon(), -1_500);
    let tags: Vec<(&str, &str)> = node.tags().collect();
    assert_eq!(tags, vec![("fixture", "yes")]);
}

#[test_log::test]
fn block_iterator_sees_header_and_data() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let iterator = BlockIterator::new(&path).expect("open");

    let mut header_blocks = 0;
    let mut primitive_blocks = 0;
    for block in iterator {
        match block.expect("decodable block") {
            BlockItem::Header(_) => header_blocks += 1,
            BlockItem::Primitive(_) => primitive_blocks += 1,
        }
    }

    assert_eq!(header_blocks, 1);
    assert_eq!(primitive_blocks, BLOCKS);
}

#[test]
fn filtered_parallel_count() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let file = OsmFileIn::open(&path).expect("open");

    let filter = TagFilter::key_value("fixture", "yes");
    let count = AtomicUsize::new(0);

    parse_parallel(file, 4, 2, &CancelToken::new(), |reader| {
        // Per-worker copy, rebuilt against each block.
        let local = filter.copy();
        local.assign_block(Some(reader));
        if !local.rebuild_cache() {
            return;
        }
        let matched = reader.iter_nodes().filter(|node| local.matches(node)).count();
        count.fetch_add(matched, Ordering::Relaxed);
    })
    .expect("worker-pool parse");

    assert_eq!(count.into_inner(), BLOCKS * NODES_PER_BLOCK as usize);
}

#[test]
fn cancelled_token_processes_nothing() {
    let (_dir, path) = write_fixture(BlobEncoding::Zlib);
    let mut file = OsmFileIn::open(&path).expect("open");

    let cancel = CancelToken::new();
    cancel.cancel();

    let mut blocks = 0_usize;
    parse_sequential(&mut file, &cancel, |_| {
        blocks += 1;
    })
    .expect("sequential parse");

    assert_eq!(blocks, 0);
}

#[test]
fn missing_header_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("headerless.osm.pbf");

    // A data blob where the header belongs.
    let mut out = OsmFileOut::create(&path, BlobEncoding::Zlib).expect("create file");
    let mut builder = PrimitiveBlockBuilder::new();
    builder.push_node(NodeLayout::Plain, 1, 0, 0, []);
    assert!(out.write_block(&mut builder).expect("write block"));
    out.finish().expect("finish");

    assert!(matches!(
        OsmFileIn::open(&path),
        Err(CodecError::Framing(_))
    ));
}

#[test]
fn truncated_frame_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("truncated.osm.pbf");
    std::fs::write(&path, [0_u8, 0, 0, 24, 0x0a, 0x02]).expect("write stub");

    assert!(OsmFileIn::open(&path).is_err());
}

#[test]
fn empty_file_reports_missing_header() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("empty.osm.pbf");
    std::fs::write(&path, []).expect("write stub");

    assert!(matches!(
        OsmFileIn::open(&path),
        Err(CodecError::Framing(_))
    ));
}
