use bytes::Bytes;
use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::commands::{CommandError, Registry};
use crate::dict::ConcurrentDict;
use crate::reply::Reply;

/// The kind of a stored value, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    String,
}

/// A stored value. Only strings exist for now; new kinds are added as variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::String(_) => Kind::String,
        }
    }
}

/// The wrapper kept in a keyspace for every key.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub data: Value,
}

impl Entity {
    pub fn string(data: impl Into<Bytes>) -> Entity {
        Entity {
            data: Value::String(data.into()),
        }
    }
}

/// One logical database: an independent namespace of keys selected by index.
///
/// Keyspaces are created once at startup, live for the whole process and are only ever emptied,
/// never dropped individually.
#[derive(Debug)]
pub struct Keyspace {
    index: usize,
    data: ConcurrentDict<Entity>,
}

impl Keyspace {
    pub fn new(index: usize) -> Keyspace {
        Keyspace {
            index,
            data: ConcurrentDict::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolves the command named by the first argument and runs it against this keyspace.
    pub fn exec(&self, registry: &Registry, cmd_line: &[Bytes]) -> Result<Reply, CommandError> {
        registry.dispatch(self, cmd_line)
    }

    pub fn get_entity(&self, key: &str) -> Option<Entity> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn put_entity(&self, key: String, entity: Entity) -> usize {
        self.data.put(key, entity)
    }

    pub fn put_if_exists(&self, key: &str, entity: Entity) -> usize {
        self.data.put_if_exists(key, entity)
    }

    pub fn put_if_absent(&self, key: String, entity: Entity) -> usize {
        self.data.put_if_absent(key, entity)
    }

    pub fn remove(&self, key: &str) -> usize {
        self.data.remove(key)
    }

    /// Removes every given key and returns how many were present.
    pub fn removes<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().map(|key| self.remove(key)).sum()
    }

    pub fn flush(&self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the keys accepted by `predicate`, in no particular order.
    pub fn scan_keys<F>(&self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut keys = vec![];
        self.data.for_each(|key, _| {
            if predicate(key) {
                keys.push(key.to_string());
            }
            true
        });
        keys
    }
}
