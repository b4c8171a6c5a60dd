//! Postcard codec for length-delimited command framing.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::command::Command;

/// Wraps [`LengthDelimitedCodec`] with automatic postcard serialization of
/// [`Command`] frames.
///
/// The frame layout is the codec's default: a 4-byte unsigned big-endian
/// length prefix followed by that many bytes of serialized command. A short
/// or oversized frame surfaces as an [`io::Error`], which closes the
/// connection.
#[derive(Debug)]
pub(crate) struct CommandCodec {
    inner: LengthDelimitedCodec,
}

impl CommandCodec {
    /// Max frame length: 4 MB. Workloads are opaque blobs but a single
    /// command is never expected near this.
    pub(crate) fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(4 * 1024 * 1024)
                .new_codec(),
        }
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let command = postcard::from_bytes(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = postcard::to_allocvec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(bytes), dst)
    }
}
