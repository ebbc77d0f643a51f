use bytes::Bytes;

use crate::commands::{CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Returns PONG if no argument is provided, otherwise returns a copy of the argument as a status.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
pub fn exec(_keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    match args {
        [] => Ok(Reply::Pong),
        [message] => Ok(Reply::status(String::from_utf8_lossy(message))),
        _ => Err(CommandError::WrongArity("ping".to_string())),
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("ping", exec, 0..);
}
