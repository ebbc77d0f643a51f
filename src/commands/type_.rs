use bytes::Bytes;

use crate::commands::{parse_key, CommandError, Registry};
use crate::reply::Reply;
use crate::store::Keyspace;

/// Returns the string representation of the type of the value stored at key, or `none` when the
/// key does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/type>
pub fn exec(keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
    let key = parse_key(&args[0])?;

    let res = match keyspace.get_entity(&key) {
        Some(entity) => Reply::status(entity.data.kind().to_string()),
        None => Reply::status("none"),
    };

    Ok(res)
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register("type", exec, 1);
}

#[cfg(test)]
mod tests {
    use crate::commands::run;
    use crate::store::Entity;

    use super::*;

    #[test]
    fn string_value() {
        let keyspace = Keyspace::new(0);
        keyspace.put_entity("foo".to_string(), Entity::string("bar"));

        let res = run(&keyspace, &["TYPE", "foo"]).unwrap();

        assert_eq!(res.to_bytes(), Bytes::from("+string\r\n"));
    }

    #[test]
    fn missing_key() {
        let keyspace = Keyspace::new(0);

        let res = run(&keyspace, &["TYPE", "foo"]).unwrap();

        assert_eq!(res, Reply::status("none"));
    }
}
