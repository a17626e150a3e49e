//! Payload compression.
//!
//! Payloads tagged with [`Compression::Gzip`] are written as zlib streams,
//! the same as the JavaScript client writes them.  The older command line
//! client writes gzip members under the same tag; [`decompress`] (and so
//! [`decode_payload`]) recognises those by their magic number.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};
use crate::header::Compression;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];


/// Deflates `data` into a zlib stream.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder =
        ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|err| Error::validation(format!("compression failed: {err}")))
}

/// Inflates a zlib stream or a gzip member.
///
/// Fails with [`Error::Decompression`] if the stream is corrupt or
/// truncated.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(inflate_zlib(data)?)
    }
}

/// Inflates a zlib stream insisting that it is complete.
///
/// Decompression runs without `Finish` flush so the output buffer can grow
/// between calls; only reaching the end of the stream counts as success.
fn inflate_zlib(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.len().max(1024));
        }
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress_vec(
                &data[before_in as usize..],
                &mut out,
                FlushDecompress::None,
            )
            .map_err(io::Error::other)?;
        if status == Status::StreamEnd {
            return Ok(out);
        }
        let stalled = inflater.total_in() == before_in &&
            inflater.total_out() == before_out;
        if stalled && out.len() < out.capacity() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated zlib stream",
            ));
        }
    }
}

/// Converts raw payload into its stored representation.
pub fn encode_payload(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => compress(data),
        Compression::Zstd => {
            Err(Error::validation("zstd compression is not supported"))
        }
    }
}

/// Converts stored payload back into its raw form.
pub fn decode_payload(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => decompress(data),
        Compression::Zstd => Err(Error::Decompression(io::Error::new(
            io::ErrorKind::Unsupported,
            "zstd compression is not supported",
        ))),
    }
}
