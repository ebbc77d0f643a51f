use bytes::Bytes;

use crate::commands::{CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Deletes all the keys of the currently selected database.
///
/// Ref: <https://redis.io/docs/latest/commands/flushdb>
pub fn exec(keyspace: &Keyspace, _args: &[Bytes]) -> Result<Reply, CommandError> {
    keyspace.flush();
    Ok(Reply::Ok)
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("flushdb", exec, 0);
}

#[cfg(test)]
mod tests {
    use crate::commands::run;
    use crate::store::Entity;

    use super::*;

    #[test]
    fn empties_the_keyspace() {
        let keyspace = Keyspace::new(0);
        keyspace.put_entity("a".to_string(), Entity::string("1"));
        keyspace.put_entity("b".to_string(), Entity::string("2"));

        let res = run(&keyspace, &["FLUSHDB"]).unwrap();

        assert_eq!(res, Reply::Ok);
        assert!(keyspace.is_empty());
    }

    #[test]
    fn rejects_arguments() {
        let keyspace = Keyspace::new(0);
        keyspace.put_entity("a".to_string(), Entity::string("1"));

        let err = run(&keyspace, &["FLUSHDB", "ASYNC"]).unwrap_err();

        assert_eq!(err, CommandError::WrongArity("flushdb".to_string()));
        assert_eq!(keyspace.len(), 1);
    }
}
