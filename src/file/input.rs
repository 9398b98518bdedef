//! The file reader: a header blob followed by a finite lazy sequence of
//! primitive blocks.

use std::path::Path;

use log::warn;
use prost::Message;

use crate::blob::iterator::BlobIterator;
use crate::error::CodecError;
use crate::model::HeaderBlock;
use crate::reader::PrimitiveReader;

/// Decompressed bytes of one primitive block, still protobuf-encoded.
pub struct BlockData {
    data: Vec<u8>,
}

impl BlockData {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the block. Malformed content yields a null reader.
    pub fn reader(&self) -> PrimitiveReader {
        PrimitiveReader::from_data(&self.data)
    }
}

pub struct OsmFileIn {
    blobs: BlobIterator,
    header: HeaderBlock,
}

impl OsmFileIn {
    /// Opens the file and decodes the leading `OSMHeader` blob. A damaged
    /// or missing header closes the file with an error.
    pub fn open(path: impl AsRef<Path>) -> Result<OsmFileIn, CodecError> {
        let mut blobs = BlobIterator::new(path)?;

        let first = match blobs.next() {
            Some(blob) => blob?,
            None => return Err(CodecError::Framing("file has no header blob")),
        };
        if !first.is_osm_header() {
            return Err(CodecError::Framing("first blob is not a header"));
        }

        let data = first.block_data()?;
        let header = HeaderBlock::decode(data.as_slice())?;

        Ok(OsmFileIn { blobs, header })
    }

    #[inline]
    pub fn header(&self) -> &HeaderBlock {
        &self.header
    }

    /// Decompressed bytes of the next data block; `Ok(None)` at end of
    /// file. Blobs that are not data, or whose payload cannot be unpacked,
    /// are skipped; framing damage is an error.
    pub fn next_block_data(&mut self) -> Result<Option<BlockData>, CodecError> {
        loop {
            let blob = match self.blobs.next() {
                Some(blob) => blob?,
                None => return Ok(None),
            };

            if !blob.is_osm_data() {
                warn!("skipping non-data blob {:?}", blob.header.r#type);
                continue;
            }

            match blob.block_data() {
                Ok(data) => return Ok(Some(BlockData { data })),
                Err(err) => {
                    warn!("skipping undecodable data blob: {err}");
                    continue;
                }
            }
        }
    }

    /// Fetches up to `count` blocks into `out`; true iff at least one
    /// arrived.
    pub fn next_blocks(
        &mut self,
        out: &mut Vec<BlockData>,
        count: usize,
    ) -> Result<bool, CodecError> {
        let mut fetched = false;

        for _ in 0..count {
            match self.next_block_data()? {
                Some(block) => {
                    out.push(block);
                    fetched = true;
                }
                None => break,
            }
        }

        Ok(fetched)
    }

    /// Decodes the next data block. Malformed block content yields a null
    /// reader for the caller to skip; `Ok(None)` is end of file.
    pub fn parse_next_block(&mut self) -> Result<Option<PrimitiveReader>, CodecError> {
        Ok(self.next_block_data()?.map(|data| data.reader()))
    }
}
