use bytes::Bytes;

use crate::commands::{parse_keys, CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Removes the specified keys. A key is ignored if it does not exist. Returns the number of keys
/// that were removed.
///
/// Ref: <https://redis.io/docs/latest/commands/del>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let keys = parse_keys(args)?;
    let removed = keyspace.removes(keys.iter().map(String::as_str));

    Ok(Reply::Integer(removed as i64))
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("del", exec, -1);
}
