//! Transparent gzip decoding of response bodies.

use std::io::{self, Cursor};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, Chain};

const GZIP_HEADER_LEN: usize = 10;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFLATE: u8 = 8;

/// Decompressing reader layered over a raw body.
pub type GzipBody<R> = GzipDecoder<BufReader<Chain<Cursor<Vec<u8>>, R>>>;

/// Build a gzip decoder over `raw`.
///
/// The member header is read and checked eagerly so a body that is not gzip
/// at all fails here rather than on the caller's first read. On error `raw`
/// is dropped, which closes it.
pub async fn gzip<R>(mut raw: R) -> io::Result<GzipBody<R>>
where
    R: AsyncRead + Unpin,
{
    let mut header = vec![0u8; GZIP_HEADER_LEN];
    raw.read_exact(&mut header).await.map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::InvalidData, "gzip header truncated")
        } else {
            err
        }
    })?;
    if header[..2] != GZIP_MAGIC || header[2] != DEFLATE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid gzip header"));
    }

    let replay = Cursor::new(header).chain(raw);
    let mut decoder = GzipDecoder::new(BufReader::new(replay));
    decoder.multiple_members(true);
    Ok(decoder)
}
