pub mod del;
pub mod exists;
pub mod flushdb;
pub mod keys;
pub mod ping;
pub mod rename;
pub mod renamenx;
pub mod select;
pub mod type_;

use bytes::Bytes;
use std::collections::HashMap;
use std::ops::RangeFrom;
use std::{fmt, str};
use thiserror::Error as ThisError;

use crate::reply::Reply;
use crate::store::Keyspace;

/// Runs a command against a keyspace. `args` excludes the command name.
pub type ExecFn = fn(&Keyspace, &[Bytes]) -> Result<Reply, CommandError>;

/// Number of arguments a command accepts, not counting its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match *self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
        }
    }
}

/// Non-negative values require an exact count, negative values a minimum of their magnitude.
impl From<i32> for Arity {
    fn from(arity: i32) -> Self {
        if arity >= 0 {
            Arity::Exact(arity as usize)
        } else {
            Arity::AtLeast(arity.unsigned_abs() as usize)
        }
    }
}

impl From<RangeFrom<usize>> for Arity {
    fn from(range: RangeFrom<usize>) -> Self {
        Arity::AtLeast(range.start)
    }
}

#[derive(Clone, Copy)]
struct Command {
    executor: ExecFn,
    arity: Arity,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("arity", &self.arity).finish()
    }
}

/// Table from lowercase command name to its executor.
///
/// Filled once at startup and only read afterwards, so it is shared without locking.
#[derive(Debug, Default)]
pub struct Registry {
    table: HashMap<String, Command>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry holding every command this server implements. `SELECT` is not part of it: it
    /// changes connection state and is handled by the database before dispatch.
    pub fn builtin() -> Registry {
        let mut registry = Registry::new();

        del::register(&mut registry);
        exists::register(&mut registry);
        flushdb::register(&mut registry);
        keys::register(&mut registry);
        ping::register(&mut registry);
        rename::register(&mut registry);
        renamenx::register(&mut registry);
        type_::register(&mut registry);

        registry
    }

    /// Registers `executor` under `name`, case-folded. A later registration of the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: &str, executor: ExecFn, arity: impl Into<Arity>) {
        let command = Command {
            executor,
            arity: arity.into(),
        };
        self.table.insert(name.to_lowercase(), command);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Validates and runs `cmd_line` against `keyspace`. Unknown commands and arity violations
    /// fail before the executor runs.
    pub fn dispatch(&self, keyspace: &Keyspace, cmd_line: &[Bytes]) -> Result<Reply, CommandError> {
        let (name, args) = cmd_line.split_first().ok_or(CommandError::EmptyCommand)?;
        let name = command_name(name);

        let command = self
            .table
            .get(&name)
            .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;

        if !command.arity.accepts(args.len()) {
            return Err(CommandError::WrongArity(name));
        }

        (command.executor)(keyspace, args)
    }
}

/// Lowercase command name of a request's first argument.
pub fn command_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_lowercase()
}

/// Keys are stored as strings, so arguments used as keys must be valid UTF-8.
pub(crate) fn parse_key(arg: &Bytes) -> Result<String, CommandError> {
    str::from_utf8(arg)
        .map(|s| s.to_string())
        .map_err(|_| CommandError::InvalidUTF8String)
}

pub(crate) fn parse_keys(args: &[Bytes]) -> Result<Vec<String>, CommandError> {
    args.iter().map(parse_key).collect()
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR empty command")]
    EmptyCommand,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR invalid DB index")]
    InvalidDbIndex,
    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,
    #[error("ERR invalid UTF-8 string")]
    InvalidUTF8String,
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::Error(err.to_string())
    }
}

#[cfg(test)]
pub(crate) fn run(keyspace: &Keyspace, cmd_line: &[&str]) -> Result<Reply, CommandError> {
    let cmd_line: Vec<Bytes> = cmd_line.iter().map(|s| Bytes::from(s.to_string())).collect();
    Registry::builtin().dispatch(keyspace, &cmd_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Entity;

    fn echo_first(_keyspace: &Keyspace, args: &[Bytes]) -> Result<Reply, CommandError> {
        Ok(Reply::Bulk(args[0].clone()))
    }

    fn always_ok(_keyspace: &Keyspace, _args: &[Bytes]) -> Result<Reply, CommandError> {
        Ok(Reply::Ok)
    }

    #[test]
    fn arity_from_int() {
        assert_eq!(Arity::from(2), Arity::Exact(2));
        assert_eq!(Arity::from(0), Arity::Exact(0));
        assert_eq!(Arity::from(-1), Arity::AtLeast(1));
        assert_eq!(Arity::from(-3), Arity::AtLeast(3));
        assert_eq!(Arity::from(0..), Arity::AtLeast(0));
    }

    #[test]
    fn arity_accepts() {
        assert!(Arity::Exact(1).accepts(1));
        assert!(!Arity::Exact(1).accepts(0));
        assert!(!Arity::Exact(1).accepts(2));
        assert!(Arity::AtLeast(1).accepts(1));
        assert!(Arity::AtLeast(1).accepts(5));
        assert!(!Arity::AtLeast(1).accepts(0));
    }

    #[test]
    fn names_are_case_folded() {
        let mut registry = Registry::new();
        registry.register("EcHo", echo_first, 1);

        assert!(registry.contains("echo"));
        assert!(registry.contains("ECHO"));

        let keyspace = Keyspace::new(0);
        let reply = registry
            .dispatch(&keyspace, &[Bytes::from("ECHO"), Bytes::from("hi")])
            .unwrap();

        assert_eq!(reply, Reply::Bulk(Bytes::from("hi")));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = Registry::new();
        registry.register("cmd", echo_first, 1);
        registry.register("CMD", always_ok, 0);

        let keyspace = Keyspace::new(0);
        let reply = registry.dispatch(&keyspace, &[Bytes::from("cmd")]).unwrap();

        assert_eq!(reply, Reply::Ok);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_command() {
        let keyspace = Keyspace::new(0);
        let err = run(&keyspace, &["NOPE", "a"]).unwrap_err();

        assert_eq!(err, CommandError::UnknownCommand("nope".to_string()));
        assert_eq!(Reply::from(err), Reply::error("ERR unknown command 'nope'"));
    }

    #[test]
    fn wrong_arity_has_no_side_effect() {
        let keyspace = Keyspace::new(0);
        keyspace.put_entity("foo".to_string(), Entity::string("1"));

        let err = run(&keyspace, &["TYPE", "foo", "bar"]).unwrap_err();

        assert_eq!(err, CommandError::WrongArity("type".to_string()));
        assert_eq!(
            Reply::from(err),
            Reply::error("ERR wrong number of arguments for 'type' command")
        );
        assert!(keyspace.contains("foo"));
    }

    #[test]
    fn empty_command_line() {
        let keyspace = Keyspace::new(0);
        let err = Registry::builtin().dispatch(&keyspace, &[]).unwrap_err();

        assert_eq!(err, CommandError::EmptyCommand);
    }

    #[test]
    fn builtin_commands() {
        let registry = Registry::builtin();

        for name in ["del", "exists", "flushdb", "keys", "ping", "rename", "renamenx", "type"] {
            assert!(registry.contains(name), "{} is not registered", name);
        }
        assert!(!registry.contains("select"));
    }

    #[test]
    fn invalid_utf8_key() {
        let keyspace = Keyspace::new(0);
        let cmd_line = [Bytes::from("DEL"), Bytes::from_static(&[0xff, 0xfe])];

        let err = Registry::builtin().dispatch(&keyspace, &cmd_line).unwrap_err();

        assert_eq!(err, CommandError::InvalidUTF8String);
    }
}
