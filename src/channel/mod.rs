//! Length-delimited framing of [Envelope]s over a [ConnectionStream].
//!
//! Each frame is a big-endian `u32` length followed by one bincode-encoded envelope. Frames are
//! decoded one at a time so that a single undecodable message does not tear the connection down.

use crate::codec::{self, Proto};
use crate::protocol::Envelope;
use crate::transport::ConnectionStream;

use bytes::Bytes;
use futures::prelude::*;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Frames larger than this are a protocol violation and close the connection.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

#[derive(Debug)]
pub enum Error {
    /// The stream failed or a frame exceeded [MAX_FRAME_LENGTH]; the channel is unusable.
    IO(std::io::Error),
    /// A well-framed message could not be decoded; the channel stays usable.
    Codec(codec::Error),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::IO(_))
    }
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub type Reader = FramedRead<ReadHalf<ConnectionStream>, LengthDelimitedCodec>;

pub type Writer = FramedWrite<WriteHalf<ConnectionStream>, LengthDelimitedCodec>;

fn length_delimited() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().max_frame_length(MAX_FRAME_LENGTH).new_codec()
}

pub struct Receiver {
    reader: Reader,
}

impl Receiver {
    /// The next envelope, or `None` once the peer closed the stream.
    pub async fn recv(&mut self) -> Result<Option<Envelope>> {
        match self.reader.next().await {
            None => Ok(None),
            Some(Err(err)) => Err(Error::IO(err)),
            Some(Ok(frame)) => Ok(Some(Envelope::from_bytes(&frame)?)),
        }
    }
}

pub struct Sender {
    writer: Writer,
}

impl Sender {
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.to_bytes()?;
        self.send_frame(Bytes::from(bytes)).await
    }

    /// Writes an already encoded frame.
    pub async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        if frame.len() > MAX_FRAME_LENGTH {
            return Err(Error::IO(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds the limit", frame.len()),
            )));
        }
        Ok(self.writer.send(frame).await?)
    }

    /// Flushes and shuts the write side down.
    pub async fn close(&mut self) -> Result<()> {
        Ok(futures::SinkExt::<Bytes>::close(&mut self.writer).await?)
    }
}

pub struct Channel {
    stream: ConnectionStream,
}

impl Channel {
    pub fn wrap(stream: ConnectionStream) -> Channel {
        Channel { stream }
    }

    pub fn split(self) -> (Sender, Receiver) {
        let (reader, writer) = tokio::io::split(self.stream);
        let reader = FramedRead::new(reader, length_delimited());
        let writer = FramedWrite::new(writer, length_delimited());
        (Sender { writer }, Receiver { reader })
    }
}
