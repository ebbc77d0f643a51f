use bytes::Bytes;
use glob_match::glob_match;
use std::str;

use crate::commands::{CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Returns all keys matching a glob-style pattern, in no particular order.
///
/// Ref: <https://redis.io/docs/latest/commands/keys>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let pattern = str::from_utf8(&args[0]).map_err(|_| CommandError::InvalidUTF8String)?;

    let keys = keyspace.scan_keys(|key| glob_match(pattern, key));
    if keys.is_empty() {
        return Ok(Reply::EmptyMultiBulk);
    }

    Ok(Reply::multi_bulk(keys.into_iter().map(Bytes::from)))
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("keys", exec, 1);
}
