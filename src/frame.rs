// https://redis.io/docs/reference/protocol-spec

use bytes::Bytes;
use itertools::Itertools;
use std::fmt;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

/// A single decoded protocol unit.
///
/// Requests from a well-formed client are always arrays of bulk strings. The single line variants
/// and the standalone bulk string exist so the decoder can also read reply traffic.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    /// An empty array is the frame produced for `*0\r\n`.
    Array(Vec<Bytes>),
}

impl Frame {
    /// Returns the arguments of a request frame. Any other frame kind yields `None`.
    pub fn into_args(self) -> Option<Vec<Bytes>> {
        match self {
            Frame::Array(args) => Some(args),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(args) => write!(
                f,
                "*{} [{}]",
                args.len(),
                args.iter().map(|arg| String::from_utf8_lossy(arg)).join(" ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(byte),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
