//! A block item, used to decode a `BlobItem` into a `BlockItem`,
//! providing distinction for the header block and primitive blocks.

use log::warn;
use prost::Message;

use crate::blob::item::BlobItem;
use crate::error::CodecError;
use crate::model::{HeaderBlock, PrimitiveBlock};
use crate::reader::PrimitiveReader;

pub enum BlockItem {
    Header(HeaderBlock),
    Primitive(PrimitiveBlock),
}

impl BlockItem {
    /// Unpacks a blob into its decoded block. Blobs of an unknown type
    /// yield `None`.
    pub fn from_blob_item(blob: &BlobItem) -> Result<Option<Self>, CodecError> {
        let data = blob.block_data()?;

        if blob.is_osm_data() {
            return Ok(Some(BlockItem::Primitive(PrimitiveBlock::decode(
                data.as_slice(),
            )?)));
        }
        if blob.is_osm_header() {
            return Ok(Some(BlockItem::Header(HeaderBlock::decode(
                data.as_slice(),
            )?)));
        }

        warn!("skipping blob of unknown type {:?}", blob.header.r#type);
        Ok(None)
    }

    pub fn r#type(&self) -> &str {
        match self {
            BlockItem::Header(_) => "HeaderBlock",
            BlockItem::Primitive(_) => "PrimitiveBlock",
        }
    }

    /// Consumes a primitive block into its reader; header blocks yield a
    /// null reader.
    pub fn into_reader(self) -> PrimitiveReader {
        match self {
            BlockItem::Primitive(block) => PrimitiveReader::from_block(block),
            BlockItem::Header(_) => PrimitiveReader::null(),
        }
    }
}
