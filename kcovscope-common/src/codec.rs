//! Compressed batch encoding
//!
//! The collector channel carries raw DEFLATE streams (level 9). Batches are
//! serialized as JSON before compression so both ends only need serde.

use crate::HandlerParams;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// Compression level used on the collector channel
pub const COMPRESSION_LEVEL: u32 = 9;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to (de)compress program batch: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed program batch: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize and compress a batch
///
/// # Errors
/// Returns an error if serialization or compression fails
pub fn encode_batch(params: &HandlerParams) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    serde_json::to_writer(&mut encoder, params)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

/// Decompress and deserialize a batch
///
/// # Errors
/// Returns an error if the stream is not valid DEFLATE or not a batch
pub fn decode_batch(bytes: &[u8]) -> Result<HandlerParams, CodecError> {
    let mut json = Vec::new();
    DeflateDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
