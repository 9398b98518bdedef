//! File-level access: the header-aware reader and the framing writer

pub mod input;
pub mod output;

#[doc(inline)]
pub use input::{BlockData, OsmFileIn};
#[doc(inline)]
pub use output::{BlobEncoding, OsmFileOut};
