//! The file blob iterator
//!
//! Streams length-framed blobs off a buffered file handle: a 4-byte
//! big-endian header length, the `BlobHeader`, then `datasize` payload
//! bytes. Reading stops cleanly at EOF on a frame boundary; EOF inside a
//! frame is a framing error.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::trace;
use prost::Message;

use crate::blob::item::BlobItem;
use crate::error::CodecError;
use crate::model::BlobHeader;

/// Upstream bound on the encoded `BlobHeader`.
const MAX_HEADER_LEN: usize = 64 * 1024;
/// Upstream bound on a blob payload.
const MAX_BLOB_LEN: usize = 32 * 1024 * 1024;

pub struct BlobIterator {
    reader: BufReader<File>,
    index: u64,
    done: bool,
}

impl BlobIterator {
    pub fn new(path: impl AsRef<Path>) -> Result<BlobIterator, CodecError> {
        let file = File::open(path)?;

        Ok(BlobIterator {
            reader: BufReader::new(file),
            index: 0,
            done: false,
        })
    }

    /// Number of blobs handed out so far.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Reads the 4-byte frame length, distinguishing clean EOF (`None`)
    /// from truncation mid-length.
    fn read_frame_len(&mut self) -> Result<Option<usize>, CodecError> {
        let mut buf = [0_u8; 4];
        let mut filled = 0;

        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(CodecError::Framing("eof inside blob header length"))
                };
            }
            filled += n;
        }

        let len = i32::from_be_bytes(buf);
        if len <= 0 || len as usize > MAX_HEADER_LEN {
            return Err(CodecError::Framing("blob header length out of bounds"));
        }

        Ok(Some(len as usize))
    }

    fn read_item(&mut self) -> Result<Option<BlobItem>, CodecError> {
        let header_len = match self.read_frame_len()? {
            Some(len) => len,
            None => return Ok(None),
        };

        let mut header_buf = vec![0_u8; header_len];
        self.reader
            .read_exact(&mut header_buf)
            .map_err(|_| CodecError::Framing("eof inside blob header"))?;

        let header = BlobHeader::decode(header_buf.as_slice())?;
        let datasize = header.datasize;
        if datasize < 0 || datasize as usize > MAX_BLOB_LEN {
            return Err(CodecError::Framing("blob payload size out of bounds"));
        }

        let mut data = vec![0_u8; datasize as usize];
        self.reader
            .read_exact(&mut data)
            .map_err(|_| CodecError::Framing("eof inside blob payload"))?;

        trace!(
            "blob {}: type={} size={}",
            self.index,
            header.r#type,
            datasize
        );
        self.index += 1;

        Ok(Some(BlobItem { header, data }))
    }
}

impl Iterator for BlobIterator {
    type Item = Result<BlobItem, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // Framing damage is not recoverable, fuse the iterator.
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
