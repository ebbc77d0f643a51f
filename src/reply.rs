use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::frame::{DataType, CRLF};

static OK: &[u8] = b"+OK\r\n";
static PONG: &[u8] = b"+PONG\r\n";
static NULL_BULK: &[u8] = b"$-1\r\n";
static EMPTY_MULTI_BULK: &[u8] = b"*0\r\n";
static UNKNOWN_ERROR: &[u8] = b"-ERR unknown\r\n";

/// Every reply shape the server writes back to a client.
///
/// Encoding never fails: the wire form is a pure function of the variant's fields. The fixed
/// replies (`Ok`, `Pong`, `NullBulk`, `EmptyMultiBulk`, `UnknownError`) encode to static bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Ok,
    Pong,
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    /// An array of bulk strings where each element may be nil.
    MultiBulk(Vec<Option<Bytes>>),
    EmptyMultiBulk,
    /// Written when dispatching a request produced no reply at all.
    UnknownError,
}

impl Reply {
    pub fn status(status: impl Into<String>) -> Reply {
        Reply::Status(status.into())
    }

    pub fn error(message: impl Into<String>) -> Reply {
        Reply::Error(message.into())
    }

    pub fn multi_bulk<I>(items: I) -> Reply
    where
        I: IntoIterator<Item = Bytes>,
    {
        Reply::MultiBulk(items.into_iter().map(Some).collect())
    }

    /// An error reply is recognised solely by its first encoded byte.
    pub fn is_error(&self) -> bool {
        self.to_bytes().first() == Some(&u8::from(DataType::SimpleError))
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Reply::Ok => Bytes::from_static(OK),
            Reply::Pong => Bytes::from_static(PONG),
            Reply::NullBulk => Bytes::from_static(NULL_BULK),
            Reply::EmptyMultiBulk => Bytes::from_static(EMPTY_MULTI_BULK),
            Reply::UnknownError => Bytes::from_static(UNKNOWN_ERROR),
            Reply::Status(s) => single_line(DataType::SimpleString, &without_newlines(s)),
            Reply::Error(s) => single_line(DataType::SimpleError, &without_newlines(s)),
            Reply::Integer(i) => single_line(DataType::Integer, i.to_string().as_bytes()),
            Reply::Bulk(data) => {
                let mut buf = BytesMut::with_capacity(data.len() + 16);
                put_bulk(&mut buf, data);
                buf.freeze()
            }
            Reply::MultiBulk(items) => {
                let length = items.len().to_string();
                let mut buf = BytesMut::with_capacity(1 + length.len() + CRLF.len());
                buf.put_u8(u8::from(DataType::Array));
                buf.put_slice(length.as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    match item {
                        Some(data) => put_bulk(&mut buf, data),
                        None => buf.put_slice(NULL_BULK),
                    }
                }
                buf.freeze()
            }
        }
    }
}

fn single_line(data_type: DataType, content: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + content.len() + CRLF.len());
    buf.put_u8(u8::from(data_type));
    buf.put_slice(content);
    buf.put_slice(CRLF);
    buf.freeze()
}

/// Single line replies cannot carry CR or LF, they are replaced by spaces.
fn without_newlines(text: &str) -> Vec<u8> {
    text.bytes()
        .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b })
        .collect()
}

// $<length>\r\n<data>\r\n
fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    let length = data.len().to_string();
    buf.reserve(1 + length.len() + CRLF.len() + data.len() + CRLF.len());
    buf.put_u8(u8::from(DataType::BulkString));
    buf.put_slice(length.as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

impl From<Reply> for Bytes {
    fn from(reply: Reply) -> Self {
        reply.to_bytes()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_bytes()).trim_end())
    }
}
