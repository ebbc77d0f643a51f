use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;
use std::{io, mem};
use thiserror::Error as ThisError;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};

use crate::frame::{DataType, Frame, CRLF};

/// Largest bulk payload accepted by default, the same limit Redis applies.
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header or single line reply accepted while waiting for its terminator.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Number of decoded frames buffered between the reading task and the connection loop.
const PIPELINE_DEPTH: usize = 128;

/// A structural violation of the wire format. The decoder reports it, resets and keeps reading.
#[derive(Debug, ThisError, PartialEq)]
pub enum ProtocolError {
    #[error("invalid multibulk length '{0}'")]
    InvalidArrayLength(String),
    #[error("invalid bulk length '{0}'")]
    InvalidBulkLength(String),
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),
    #[error("unknown message type '{0}'")]
    UnknownDataType(String),
    #[error("line is not terminated by CRLF")]
    MissingCrlf,
    #[error("bulk payload is not terminated by CRLF")]
    InvalidBulkTerminator,
    #[error("line exceeds {0} bytes without a terminator")]
    LineTooLong(usize),
    #[error("bulk length {length} exceeds the {max} bytes limit")]
    BulkTooLarge { length: usize, max: usize },
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
}

#[derive(Debug, ThisError)]
pub enum DecodeError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The peer closed the stream at a frame boundary.
    #[error("connection closed by peer")]
    Eof,
    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed in the middle of a frame")]
    UnexpectedEof,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Transport errors end the stream, protocol errors do not.
    pub fn is_transport(&self) -> bool {
        !matches!(self, DecodeError::Protocol(_))
    }
}

/// One result of the decoding stream.
pub type Payload = Result<Frame, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum MessageKind {
    Array,
    Bulk,
}

/// Progress of the message currently being decoded. Reset after every complete frame and after
/// every protocol error.
#[derive(Debug, Default)]
struct DecoderState {
    /// Set once a header announced a body, i.e. while reading past the first line of a message.
    kind: Option<MessageKind>,
    expected: usize,
    args: Vec<Bytes>,
    /// Length of a bulk payload whose header was read but whose bytes were not.
    bulk_len: Option<usize>,
}

impl DecoderState {
    fn reading_multiline(&self) -> bool {
        self.kind.is_some()
    }

    fn finished(&self) -> bool {
        self.expected > 0 && self.args.len() == self.expected
    }
}

/// The smallest piece the decoder reads from the buffer.
enum Unit {
    /// A CRLF terminated line, without the terminator.
    Line(Bytes),
    /// A bulk payload whose length was declared beforehand, without the trailing CRLF.
    Payload(Bytes),
}

/// Incremental RESP decoder.
///
/// Protocol violations are yielded as `Ok(Some(Err(_)))` items so that a `FramedRead` keeps
/// polling after them. Only I/O failures surface through the `Decoder::Error` channel.
#[derive(Debug)]
pub struct FrameCodec {
    state: DecoderState,
    max_bulk_len: usize,
    /// Bytes of a rejected oversized payload (and its CRLF) still to be discarded.
    skip: usize,
}

impl FrameCodec {
    pub fn new(max_bulk_len: usize) -> FrameCodec {
        FrameCodec {
            state: DecoderState::default(),
            max_bulk_len,
            skip: 0,
        }
    }

    fn read_unit(&mut self, src: &mut BytesMut) -> Result<Option<Unit>, ProtocolError> {
        if let Some(len) = self.state.bulk_len {
            let needed = len + CRLF.len();
            if src.len() < needed {
                src.reserve(needed - src.len());
                return Ok(None);
            }

            let mut chunk = src.split_to(needed);
            self.state.bulk_len = None;
            if &chunk[len..] != CRLF {
                return Err(ProtocolError::InvalidBulkTerminator);
            }
            chunk.truncate(len);
            return Ok(Some(Unit::Payload(chunk.freeze())));
        }

        let newline = match src.iter().position(|b| *b == b'\n') {
            Some(newline) => newline,
            None if src.len() > MAX_LINE_LEN => {
                src.clear();
                return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
            }
            None => return Ok(None),
        };

        let mut line = src.split_to(newline + 1);
        if newline == 0 || line[newline - 1] != b'\r' {
            return Err(ProtocolError::MissingCrlf);
        }
        line.truncate(newline - 1);

        Ok(Some(Unit::Line(line.freeze())))
    }

    fn process(&mut self, unit: Unit) -> Result<Option<Frame>, ProtocolError> {
        match unit {
            Unit::Payload(data) => self.state.args.push(data),
            Unit::Line(line) if !self.state.reading_multiline() => return self.parse_header(line),
            Unit::Line(line) => self.parse_body_line(line)?,
        }

        if self.state.finished() {
            return Ok(Some(self.emit()));
        }

        Ok(None)
    }

    fn parse_header(&mut self, mut line: Bytes) -> Result<Option<Frame>, ProtocolError> {
        if line.is_empty() {
            // Stray CRLF between messages.
            return Ok(None);
        }

        let marker = line.get_u8();
        let data_type = DataType::try_from(marker)
            .map_err(|byte| ProtocolError::UnknownDataType(escape(&[byte])))?;

        match data_type {
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                let count = parse_decimal::<u32>(&line)
                    .ok_or_else(|| ProtocolError::InvalidArrayLength(escape(&line)))?
                    as usize;

                if count == 0 {
                    return Ok(Some(Frame::Array(vec![])));
                }

                self.state.kind = Some(MessageKind::Array);
                self.state.expected = count;
                self.state.args = Vec::with_capacity(count.min(1024));
                Ok(None)
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = parse_decimal::<i64>(&line)
                    .ok_or_else(|| ProtocolError::InvalidBulkLength(escape(&line)))?;

                if length == -1 {
                    return Ok(Some(Frame::Null));
                }
                if length <= 0 {
                    return Err(ProtocolError::InvalidBulkLength(escape(&line)));
                }

                self.state.kind = Some(MessageKind::Bulk);
                self.state.expected = 1;
                self.state.args = Vec::with_capacity(1);
                self.state.bulk_len = Some(self.checked_bulk_len(length)?);
                Ok(None)
            }
            DataType::SimpleString => Ok(Some(Frame::Simple(utf8(line)?))),
            DataType::SimpleError => Ok(Some(Frame::Error(utf8(line)?))),
            DataType::Integer => {
                let integer = parse_decimal::<i64>(&line)
                    .ok_or_else(|| ProtocolError::InvalidInteger(escape(&line)))?;
                Ok(Some(Frame::Integer(integer)))
            }
        }
    }

    fn parse_body_line(&mut self, line: Bytes) -> Result<(), ProtocolError> {
        if line.first() != Some(&u8::from(DataType::BulkString)) {
            // Elements that are not bulk strings are kept verbatim.
            self.state.args.push(line);
            return Ok(());
        }

        let length = parse_decimal::<i64>(&line[1..])
            .ok_or_else(|| ProtocolError::InvalidBulkLength(escape(&line[1..])))?;

        match length {
            // A nil element is recorded as an empty argument.
            -1 => self.state.args.push(Bytes::new()),
            length if length < 0 => {
                return Err(ProtocolError::InvalidBulkLength(escape(&line[1..])));
            }
            length => self.state.bulk_len = Some(self.checked_bulk_len(length)?),
        }

        Ok(())
    }

    fn checked_bulk_len(&mut self, length: i64) -> Result<usize, ProtocolError> {
        let length = usize::try_from(length)
            .map_err(|_| ProtocolError::InvalidBulkLength(length.to_string()))?;

        if length > self.max_bulk_len {
            self.skip = length.saturating_add(CRLF.len());
            return Err(ProtocolError::BulkTooLarge {
                length,
                max: self.max_bulk_len,
            });
        }

        Ok(length)
    }

    fn emit(&mut self) -> Frame {
        let state = mem::take(&mut self.state);
        match state.kind {
            Some(MessageKind::Bulk) => Frame::Bulk(state.args.into_iter().next().unwrap_or_default()),
            _ => Frame::Array(state.args),
        }
    }

    fn reset(&mut self, err: ProtocolError) -> ProtocolError {
        self.state = DecoderState::default();
        err
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_MAX_BULK_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Frame, ProtocolError>;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.skip > 0 {
            let discard = self.skip.min(src.len());
            src.advance(discard);
            self.skip -= discard;
            if self.skip > 0 {
                return Ok(None);
            }
        }

        loop {
            let unit = match self.read_unit(src) {
                Ok(Some(unit)) => unit,
                Ok(None) => return Ok(None),
                Err(err) => return Ok(Some(Err(self.reset(err)))),
            };

            match self.process(unit) {
                Ok(Some(frame)) => return Ok(Some(Ok(frame))),
                Ok(None) => continue,
                Err(err) => return Ok(Some(Err(self.reset(err)))),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() && !self.state.reading_multiline() && self.skip == 0 => {
                Ok(None)
            }
            None => {
                src.clear();
                self.state = DecoderState::default();
                self.skip = 0;
                Err(DecodeError::UnexpectedEof)
            }
        }
    }
}

/// Decodes `reader` on a dedicated task and returns the ordered stream of results.
///
/// The stream ends after the first transport error, which is always delivered: a clean close
/// shows up as [`DecodeError::Eof`]. The task stops early when the receiver is dropped.
pub fn parse_stream<R>(reader: R, max_bulk_len: usize) -> mpsc::Receiver<Payload>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(PIPELINE_DEPTH);

    tokio::spawn(async move {
        let mut frames = FramedRead::new(reader, FrameCodec::new(max_bulk_len));

        loop {
            let next = tokio::select! {
                next = frames.next() => next,
                _ = tx.closed() => return,
            };

            let (payload, last) = match next {
                Some(Ok(Ok(frame))) => (Ok(frame), false),
                Some(Ok(Err(err))) => (Err(DecodeError::Protocol(err)), false),
                Some(Err(err)) => (Err(err), true),
                None => (Err(DecodeError::Eof), true),
            };

            if tx.send(payload).await.is_err() || last {
                return;
            }
        }
    });

    rx
}

fn parse_decimal<T: std::str::FromStr>(src: &[u8]) -> Option<T> {
    std::str::from_utf8(src).ok()?.parse().ok()
}

fn utf8(line: Bytes) -> Result<String, ProtocolError> {
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn escape(src: &[u8]) -> String {
    src.escape_ascii().to_string()
}
