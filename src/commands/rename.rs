use bytes::Bytes;

use crate::commands::{parse_key, CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Renames `key` to `newkey`, overwriting `newkey` when it already exists. It returns an error
/// when `key` does not exist. Renaming a key to itself leaves it untouched.
///
/// Ref: <https://redis.io/docs/latest/commands/rename>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let src = parse_key(&args[0])?;
    let dest = parse_key(&args[1])?;

    let entity = keyspace.get_entity(&src).ok_or(CommandError::NoSuchKey)?;
    if src == dest {
        return Ok(Reply::Ok);
    }

    keyspace.remove(&src);
    keyspace.put_entity(dest, entity);

    Ok(Reply::Ok)
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("rename", exec, 2);
}
