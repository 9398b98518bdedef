use thiserror::Error;

/// Errors surfaced by the codec.
///
/// End-of-file is not an error: block iterators report it as `Ok(None)` or
/// `false`. Cursor reads never fail either, they yield zero/empty values on
/// invalid positions.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed blob framing: {0}")]
    Framing(&'static str),

    #[error("unsupported blob compression: {0}")]
    UnsupportedCompression(&'static str),

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protobuf encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
}
