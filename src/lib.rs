//! Block codec and streaming access layer for OpenStreetMap `.osm.pbf`
//! files.
//!
//! The format packs nodes, ways and relations into length-framed,
//! optionally compressed blocks, each with its own interned string table;
//! coordinates, ids and way refs are delta-coded inside a block. This crate
//! covers both directions and the processing layer above them:
//!
//! - [`blob`] / [`block`]: the length-prefixed frame codec and block
//!   dispatch,
//! - [`reader`]: lazy cursor views over one decoded block, including the
//!   dense-node delta stream,
//! - [`writer`]: the block encoder with its string interner and flush-time
//!   delta encoding,
//! - [`filter`]: composable tag predicates with per-block id caches,
//! - [`parallel`]: sequential, fork-join and worker-pool file pipelines,
//! - [`file`]: the header-aware file reader and writer.

pub mod blob;
pub mod block;
pub mod error;
pub mod file;
pub mod filter;
pub mod model;
pub mod parallel;
pub mod reader;
pub mod writer;

#[doc(hidden)]
mod test;

#[doc(inline)]
pub use blob::BlobIterator;
#[doc(inline)]
pub use block::{BlockItem, BlockIterator};
#[doc(inline)]
pub use error::CodecError;
#[doc(inline)]
pub use file::{BlobEncoding, BlockData, OsmFileIn, OsmFileOut};
#[doc(inline)]
pub use filter::{FilterRef, TagFilter};
#[doc(inline)]
pub use parallel::{
    parse_fork_join, parse_parallel, parse_reduce, parse_sequential, CancelToken,
};
#[doc(inline)]
pub use reader::{Primitive, PrimitiveReader, PrimitiveType, PrimitiveTypeSet};
#[doc(inline)]
pub use writer::{NodeLayout, PrimitiveBlockBuilder, RelationMember, StringTableBuilder};
