use bytes::Bytes;
use std::str;

use crate::commands::CommandError;

/// Parses the argument of `SELECT`: the zero-based index of the logical database the connection
/// switches to. New connections always use the database 0.
///
/// `SELECT` changes connection state rather than a keyspace, so it is not part of the registry.
///
/// Ref: <https://redis.io/docs/latest/commands/select>
pub fn parse_index(args: &[Bytes], database_count: usize) -> Result<usize, CommandError> {
    let [index] = args else {
        return Err(CommandError::WrongArity("select".to_string()));
    };

    let index: i64 = str::from_utf8(index)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::InvalidDbIndex)?;

    match usize::try_from(index) {
        Ok(index) if index < database_count => Ok(index),
        _ => Err(CommandError::DbIndexOutOfRange),
    }
}
