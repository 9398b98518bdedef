//! The file writer: one header blob, then framed data blobs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;

use crate::blob::item::{OSM_DATA_TYPE, OSM_HEADER_TYPE};
use crate::error::CodecError;
use crate::model;
use crate::model::blob::Data;
use crate::writer::PrimitiveBlockBuilder;

/// How data blobs are packed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobEncoding {
    Raw,
    Zlib,
}

pub struct OsmFileOut {
    out: BufWriter<File>,
    encoding: BlobEncoding,
}

impl OsmFileOut {
    pub fn create(path: impl AsRef<Path>, encoding: BlobEncoding) -> Result<OsmFileOut, CodecError> {
        let file = File::create(path)?;

        Ok(OsmFileOut {
            out: BufWriter::new(file),
            encoding,
        })
    }

    /// A header announcing the features this writer emits.
    pub fn default_header() -> model::HeaderBlock {
        model::HeaderBlock {
            required_features: vec!["OsmSchema-V0.6".to_owned(), "DenseNodes".to_owned()],
            writingprogram: Some("osmblock".to_owned()),
            ..Default::default()
        }
    }

    /// Writes the header blob. Must come first, exactly once.
    pub fn write_header(&mut self, header: &model::HeaderBlock) -> Result<(), CodecError> {
        let bytes = header.encode_to_vec();
        self.write_blob(OSM_HEADER_TYPE, &bytes)
    }

    /// Flushes the builder and frames the block as a data blob. Returns
    /// false, writing nothing, when the builder had nothing to flush.
    pub fn write_block(&mut self, builder: &mut PrimitiveBlockBuilder) -> Result<bool, CodecError> {
        let mut buffer = Vec::new();
        if !builder.flush(&mut buffer) {
            return Ok(false);
        }

        self.write_blob(OSM_DATA_TYPE, &buffer)?;
        Ok(true)
    }

    /// Frames one blob: big-endian header length, `BlobHeader`, `Blob`.
    pub fn write_blob(&mut self, r#type: &str, data: &[u8]) -> Result<(), CodecError> {
        let raw_size = data.len() as i32;
        let payload = match self.encoding {
            BlobEncoding::Raw => Data::Raw(data.to_vec()),
            BlobEncoding::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                Data::ZlibData(encoder.finish()?)
            }
        };

        let blob = model::Blob {
            raw_size: Some(raw_size),
            data: Some(payload),
        };
        let blob_bytes = blob.encode_to_vec();

        let header = model::BlobHeader {
            r#type: r#type.to_owned(),
            indexdata: None,
            datasize: blob_bytes.len() as i32,
        };
        let header_bytes = header.encode_to_vec();

        self.out
            .write_all(&(header_bytes.len() as i32).to_be_bytes())?;
        self.out.write_all(&header_bytes)?;
        self.out.write_all(&blob_bytes)?;

        Ok(())
    }

    /// Flushes buffered output. Dropping without calling this may lose the
    /// tail of the file.
    pub fn finish(mut self) -> Result<(), CodecError> {
        self.out.flush()?;
        Ok(())
    }
}
