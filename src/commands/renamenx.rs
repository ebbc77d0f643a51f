use bytes::Bytes;

use crate::commands::{parse_key, CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Renames `key` to `newkey` if `newkey` does not yet exist. Returns 1 when renamed and 0 when
/// `newkey` already exists.
///
/// `newkey` is only ever stored with a put-if-absent, so a concurrent write to it is never
/// overwritten. The store and the removal of `key` are separate steps: a concurrent reader may see
/// both keys for a moment.
///
/// Ref: <https://redis.io/docs/latest/commands/renamenx>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let src = parse_key(&args[0])?;
    let dest = parse_key(&args[1])?;

    if keyspace.contains(&dest) {
        return Ok(Reply::Integer(0));
    }

    let entity = keyspace.get_entity(&src).ok_or(CommandError::NoSuchKey)?;
    if keyspace.put_if_absent(dest, entity) == 0 {
        return Ok(Reply::Integer(0));
    }
    keyspace.remove(&src);

    Ok(Reply::Integer(1))
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("renamenx", exec, 2);
}
