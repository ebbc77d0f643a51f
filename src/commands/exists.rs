use bytes::Bytes;

use crate::commands::{parse_keys, CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Returns how many of the given keys exist. A key mentioned several times is counted every time.
///
/// Ref: <https://redis.io/docs/latest/commands/exists>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let count = parse_keys(args)?
        .iter()
        .filter(|key| keyspace.contains(key))
        .count();

    Ok(Reply::Integer(count as i64))
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("exists", exec, -1);
}
