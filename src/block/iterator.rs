//! Iterates over `BlockItem`s in the file

use std::path::Path;

use crate::blob::iterator::BlobIterator;
use crate::block::item::BlockItem;
use crate::error::CodecError;

/// Sequential walk over every decodable block in a file, the header block
/// included.
pub struct BlockIterator {
    iter: BlobIterator,
}

impl BlockIterator {
    #[inline]
    pub fn new(path: impl AsRef<Path>) -> Result<BlockIterator, CodecError> {
        Ok(BlockIterator {
            iter: BlobIterator::new(path)?,
        })
    }
}

impl Iterator for BlockIterator {
    type Item = Result<BlockItem, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let blob = match self.iter.next()? {
                Ok(blob) => blob,
                Err(err) => return Some(Err(err)),
            };

            match BlockItem::from_blob_item(&blob) {
                Ok(Some(block)) => return Some(Ok(block)),
                // Unknown blob type, move on to the next frame.
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
