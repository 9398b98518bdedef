//! Describes the `BlobItem`, one length-framed unit of the file.

use std::io::Read;

use flate2::read::ZlibDecoder;
use prost::Message;

use crate::error::CodecError;
use crate::model::blob::Data;
use crate::model::{Blob, BlobHeader};

pub const OSM_HEADER_TYPE: &str = "OSMHeader";
pub const OSM_DATA_TYPE: &str = "OSMData";

/// One framed blob: its decoded `BlobHeader` and the raw (still
/// protobuf-encoded) `Blob` payload bytes.
pub struct BlobItem {
    pub header: BlobHeader,
    pub data: Vec<u8>,
}

impl BlobItem {
    #[inline]
    pub fn is_osm_header(&self) -> bool {
        self.header.r#type == OSM_HEADER_TYPE
    }

    #[inline]
    pub fn is_osm_data(&self) -> bool {
        self.header.r#type == OSM_DATA_TYPE
    }

    /// Decodes the `Blob` message and unpacks its payload to plain block
    /// bytes, dispatching on the compression variant.
    pub fn block_data(&self) -> Result<Vec<u8>, CodecError> {
        let blob = Blob::decode(self.data.as_slice())?;
        let raw_size = blob.raw_size.unwrap_or(0).max(0) as usize;

        match blob.data {
            Some(Data::Raw(data)) => Ok(data),
            Some(Data::ZlibData(data)) => zlib_decode(&data, raw_size),
            Some(Data::LzmaData(_)) => Err(CodecError::UnsupportedCompression("lzma")),
            Some(Data::ObsoleteBzip2Data(_)) => Err(CodecError::UnsupportedCompression("bzip2")),
            Some(Data::Lz4Data(_)) => Err(CodecError::UnsupportedCompression("lz4")),
            Some(Data::ZstdData(_)) => Err(CodecError::UnsupportedCompression("zstd")),
            None => Err(CodecError::Framing("blob carries no payload")),
        }
    }
}

#[inline]
fn zlib_decode(data: &[u8], raw_size: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoded = Vec::with_capacity(raw_size);
    ZlibDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}
