//! Key-value commands shared by direct calls and scripts.

use super::context::ScriptContext;
use crate::reply::{Outcome, Reply};
use crate::Error;
use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

/// Reply sent when a write is attempted from a read-only script.
pub const READ_ONLY_SCRIPT_ERROR: &str = "ERR Write commands are not allowed from read-only scripts";

/// Something commands can read and write.
pub(crate) trait Store {
    fn get(&self, key: &[u8]) -> Option<Bytes>;
    fn put(&mut self, key: Bytes, value: Bytes);
    fn delete(&mut self, key: Bytes) -> bool;
}

impl Store for ScriptContext {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        ScriptContext::get(self, key)
    }

    fn put(&mut self, key: Bytes, value: Bytes) {
        ScriptContext::put(self, key, value)
    }

    fn delete(&mut self, key: Bytes) -> bool {
        ScriptContext::delete(self, key)
    }
}

/// Unbuffered access to the keyspace, used outside scripts.
pub(crate) struct Direct<'a>(pub &'a SkipMap<Bytes, Bytes>);

impl Store for Direct<'_> {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.0.get(key).map(|e| e.value().clone())
    }

    fn put(&mut self, key: Bytes, value: Bytes) {
        self.0.insert(key, value);
    }

    fn delete(&mut self, key: Bytes) -> bool {
        self.0.remove(&key).is_some()
    }
}

/// Returns true for commands that modify the keyspace.
pub(crate) fn is_write(name: &str) -> bool {
    matches!(name, "SET" | "DEL")
}

pub(crate) fn arity_error(name: &str) -> Error {
    Error::server(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

/// Executes a key-value command. `args[0]` is the command name.
///
/// `read_only` rejects writes; it is set while running `*_RO` scripts.
pub(crate) fn execute(store: &mut dyn Store, args: &[Bytes], read_only: bool) -> Outcome {
    let Some(first) = args.first() else {
        return Err(Error::server("ERR empty command"));
    };
    let name = String::from_utf8_lossy(first).to_ascii_uppercase();
    if read_only && is_write(&name) {
        return Err(Error::server(READ_ONLY_SCRIPT_ERROR));
    }

    match name.as_str() {
        "PING" => match args.len() {
            1 => Ok(Reply::status("PONG")),
            2 => Ok(Reply::Bulk(args[1].clone())),
            _ => Err(arity_error(&name)),
        },
        "GET" => {
            if args.len() != 2 {
                return Err(arity_error(&name));
            }
            Ok(store.get(&args[1]).map_or(Reply::Nil, Reply::Bulk))
        }
        "SET" => {
            if args.len() != 3 {
                return Err(arity_error(&name));
            }
            store.put(args[1].clone(), args[2].clone());
            Ok(Reply::ok())
        }
        "DEL" => {
            if args.len() < 2 {
                return Err(arity_error(&name));
            }
            let removed = args[1..].iter().filter(|k| store.delete((*k).clone())).count();
            Ok(Reply::Int(removed as i64))
        }
        "EXISTS" => {
            if args.len() < 2 {
                return Err(arity_error(&name));
            }
            let found = args[1..].iter().filter(|k| store.get(k).is_some()).count();
            Ok(Reply::Int(found as i64))
        }
        _ => Err(Error::server(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(first)
        ))),
    }
}
