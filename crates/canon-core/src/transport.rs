//! Byte sources.
//!
//! The request itself (auth, retries, URLs) belongs to the caller. These
//! adapters only turn a response body into the boxed chunk stream the frame
//! decoder reads from. Dropping the stream drops the body, which closes the
//! connection instead of draining it.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::BoxError;

/// One HTTP response body, as chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Adapts a `reqwest` response body.
pub fn from_response(response: reqwest::Response) -> ByteStream {
    from_stream(response.bytes_stream())
}

/// Adapts any chunk stream whose error converts into a boxed error.
pub fn from_stream<S, B, E>(stream: S) -> ByteStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Into<Bytes>,
    E: Into<BoxError>,
{
    Box::pin(stream.map(|chunk| chunk.map(Into::into).map_err(Into::into)))
}

/// A byte source over chunks already in memory.
pub fn from_chunks<I, B>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = B>,
    I::IntoIter: Send + 'static,
    B: Into<Bytes>,
{
    Box::pin(futures::stream::iter(
        chunks.into_iter().map(|chunk| Ok(chunk.into())),
    ))
}
