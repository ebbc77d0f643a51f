use bytes::Bytes;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{debug, error, info};

use crate::commands::{command_name, select, CommandError, Registry};
use crate::connection::Connection;
use crate::reply::Reply;
use crate::store::Keyspace;
use crate::Error;

pub const DEFAULT_DATABASES: usize = 16;

#[derive(Debug, ThisError, PartialEq)]
pub enum ExecError {
    /// The command panicked. No reply was produced for it.
    #[error("command panicked: {0}")]
    Panicked(String),
}

/// What the connection layer needs from a storage engine.
pub trait Engine: Send + Sync {
    fn exec(&self, conn: &Connection, cmd_line: &[Bytes]) -> Result<Reply, ExecError>;

    /// Called once for every connection after it has been closed.
    fn after_client_close(&self, conn: &Connection);

    /// Called once, after every connection has been closed, when the server shuts down.
    fn close(&self);
}

/// A fixed set of keyspaces addressed by index, each connection working on the one it selected.
#[derive(Debug)]
pub struct Database {
    keyspaces: Vec<Keyspace>,
    registry: Arc<Registry>,
}

impl Database {
    pub fn new(database_count: usize) -> Result<Database, Error> {
        Database::with_registry(database_count, Arc::new(Registry::builtin()))
    }

    pub fn with_registry(database_count: usize, registry: Arc<Registry>) -> Result<Database, Error> {
        if database_count == 0 {
            return Err("at least one database is required".into());
        }

        let keyspaces = (0..database_count).map(Keyspace::new).collect();
        Ok(Database {
            keyspaces,
            registry,
        })
    }

    pub fn len(&self) -> usize {
        self.keyspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyspaces.is_empty()
    }

    pub fn keyspace(&self, index: usize) -> Option<&Keyspace> {
        self.keyspaces.get(index)
    }

    fn select(&self, conn: &Connection, args: &[Bytes]) -> Reply {
        match select::parse_index(args, self.keyspaces.len()) {
            Ok(index) => {
                conn.select_db(index);
                Reply::Ok
            }
            Err(err) => err.into(),
        }
    }
}

impl Engine for Database {
    fn exec(&self, conn: &Connection, cmd_line: &[Bytes]) -> Result<Reply, ExecError> {
        if let Some((name, args)) = cmd_line.split_first() {
            if command_name(name) == "select" {
                return Ok(self.select(conn, args));
            }
        }

        let Some(keyspace) = self.keyspaces.get(conn.db_index()) else {
            return Ok(CommandError::DbIndexOutOfRange.into());
        };

        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            keyspace.exec(&self.registry, cmd_line)
        }));

        match res {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Ok(err.into()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    db = keyspace.index(),
                    "Command {:?} panicked: {}",
                    cmd_line.first().map(|name| command_name(name)),
                    message
                );
                Err(ExecError::Panicked(message))
            }
        }
    }

    fn after_client_close(&self, conn: &Connection) {
        debug!(connection_id = %conn.id, "Client closed");
    }

    fn close(&self) {
        info!("Database closed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Replies to every request with its own arguments. Keeps no state, which makes it useful to
/// exercise the protocol and connection layers on their own.
#[derive(Debug, Default)]
pub struct EchoDatabase;

impl Engine for EchoDatabase {
    fn exec(&self, _conn: &Connection, cmd_line: &[Bytes]) -> Result<Reply, ExecError> {
        Ok(Reply::multi_bulk(cmd_line.iter().cloned()))
    }

    fn after_client_close(&self, _conn: &Connection) {
        info!("EchoDatabase after client close");
    }

    fn close(&self) {
        info!("EchoDatabase closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DEFAULT_DRAIN_TIMEOUT;
    use tokio::io::sink;

    fn connection() -> Connection {
        Connection::new(sink(), "127.0.0.1:50000".parse().unwrap(), DEFAULT_DRAIN_TIMEOUT)
    }

    fn cmd(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn boom(_keyspace: &Keyspace, _args: &[Bytes]) -> Result<Reply, CommandError> {
        panic!("boom");
    }

    #[test]
    fn requires_one_database() {
        assert!(Database::new(0).is_err());
        assert_eq!(Database::new(DEFAULT_DATABASES).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn keyspaces_are_isolated() {
        let db = Database::new(2).unwrap();
        let conn = connection();

        db.exec(&conn, &cmd(&["SELECT", "1"])).unwrap();
        db.keyspace(1)
            .unwrap()
            .put_entity("k".to_string(), crate::store::Entity::string("v"));

        assert_eq!(db.exec(&conn, &cmd(&["EXISTS", "k"])), Ok(Reply::Integer(1)));

        db.exec(&conn, &cmd(&["SELECT", "0"])).unwrap();
        assert_eq!(db.exec(&conn, &cmd(&["EXISTS", "k"])), Ok(Reply::Integer(0)));
    }

    #[tokio::test]
    async fn select_out_of_range_keeps_the_index() {
        let db = Database::new(DEFAULT_DATABASES).unwrap();
        let conn = connection();
        db.exec(&conn, &cmd(&["select", "2"])).unwrap();

        let res = db.exec(&conn, &cmd(&["SELECT", "99"])).unwrap();

        assert_eq!(res, Reply::error("ERR DB index is out of range"));
        assert_eq!(conn.db_index(), 2);
    }

    #[tokio::test]
    async fn select_errors() {
        let db = Database::new(DEFAULT_DATABASES).unwrap();
        let conn = connection();

        assert_eq!(
            db.exec(&conn, &cmd(&["SELECT", "x"])),
            Ok(Reply::error("ERR invalid DB index"))
        );
        assert_eq!(
            db.exec(&conn, &cmd(&["SELECT"])),
            Ok(Reply::error("ERR wrong number of arguments for 'select' command"))
        );
        assert_eq!(conn.db_index(), 0);
    }

    #[tokio::test]
    async fn command_errors_become_replies() {
        let db = Database::new(1).unwrap();
        let conn = connection();

        assert_eq!(
            db.exec(&conn, &cmd(&["NOPE"])),
            Ok(Reply::error("ERR unknown command 'nope'"))
        );
    }

    #[tokio::test]
    async fn panics_are_captured() {
        let mut registry = Registry::builtin();
        registry.register("boom", boom, 0);
        let db = Database::with_registry(1, Arc::new(registry)).unwrap();
        let conn = connection();

        let err = db.exec(&conn, &cmd(&["BOOM"])).unwrap_err();
        assert_eq!(err, ExecError::Panicked("boom".to_string()));

        assert_eq!(db.exec(&conn, &cmd(&["PING"])), Ok(Reply::Pong));
    }

    #[tokio::test]
    async fn echo() {
        let db = EchoDatabase;
        let conn = connection();

        let res = db.exec(&conn, &cmd(&["SET", "a", "1"])).unwrap();

        assert_eq!(
            res.to_bytes(),
            Bytes::from("*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n")
        );
    }
}
