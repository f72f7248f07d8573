//! LuaRunner executes script bodies in a fresh, sandboxed Lua VM.
//!
//! Each run gets `KEYS` and `ARGV` tables and a `server` table (also bound
//! as `redis`) whose `call` and `pcall` functions run key-value commands
//! against a [`ScriptContext`]. Writes are buffered in the context and only
//! committed if the script returns normally.

use super::commands;
use super::context::ScriptContext;
use crate::reply::{Outcome, Reply};
use crate::{Error, Result};
use bytes::Bytes;
use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT_MESSAGE: &str = "Script execution timeout";

// Base library functions that reach the host filesystem.
const HIDDEN_GLOBALS: &[&str] = &["dofile", "loadfile"];

/// Reply sent when a script exceeds its time limit.
pub const SCRIPT_TIMEOUT_ERROR: &str = "ERR Script execution timeout";

/// Parameters of one script run.
pub struct ScriptRun<'a> {
    /// The script source.
    pub body: &'a str,
    /// Values for `KEYS`.
    pub keys: Vec<Bytes>,
    /// Values for `ARGV`.
    pub args: Vec<Bytes>,
    /// Reject write commands.
    pub read_only: bool,
    /// Abort the script after this long.
    pub timeout: Option<Duration>,
}

/// Runs scripts.
#[derive(Debug, Clone)]
pub struct LuaRunner {
    hook_interval: u32,
}

impl LuaRunner {
    /// Creates a runner that checks the time limit every `hook_interval` VM instructions.
    pub fn new(hook_interval: u32) -> Self {
        Self { hook_interval }
    }

    /// Checks that `body` compiles without running it.
    pub fn compile(&self, body: &str) -> Result<()> {
        let lua = Lua::new_with(StdLib::NONE, LuaOptions::default())
            .map_err(|e| Error::server(format!("ERR failed to create script VM: {}", e)))?;
        let compiled = lua.load(body).into_function().map(|_| ());
        compiled.map_err(|e| Error::server(format!("ERR Error compiling script: {}", root_message(&e))))
    }

    /// Runs a script, committing `context` only on success.
    pub fn run(&self, run: ScriptRun<'_>, context: ScriptContext) -> Outcome {
        let start_time = Instant::now();

        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )
        .map_err(|e| Error::server(format!("ERR failed to create script VM: {}", e)))?;
        let context = Arc::new(Mutex::new(context));

        if let Some(timeout) = run.timeout {
            lua.set_hook(
                HookTriggers { every_nth_instruction: Some(self.hook_interval), ..Default::default() },
                move |_lua, _debug| {
                    if start_time.elapsed() > timeout {
                        Err(mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_string()))
                    } else {
                        Ok(())
                    }
                },
            );
        }

        let result = match eval(&lua, &run, Arc::clone(&context)) {
            Ok(value) => lua_to_reply(value),
            Err(e) => {
                let msg = root_message(&e);
                log::warn!("script failed after {:?}: {}", start_time.elapsed(), msg);
                if msg.contains(TIMEOUT_MESSAGE) {
                    Err(Error::server(SCRIPT_TIMEOUT_ERROR))
                } else {
                    Err(Error::server(format!("ERR Error running script: {}", msg)))
                }
            }
        };

        drop(lua);
        let context = context.lock().take();

        match result {
            Ok(reply) => {
                log::trace!(
                    "script ran in {:?}, committing {} writes",
                    start_time.elapsed(),
                    context.operation_count()
                );
                context.commit();
                Ok(reply)
            }
            Err(e) => {
                context.rollback();
                Err(e)
            }
        }
    }
}

fn eval<'lua>(
    lua: &'lua Lua,
    run: &ScriptRun<'_>,
    context: Arc<Mutex<ScriptContext>>,
) -> mlua::Result<Value<'lua>> {
    let globals = lua.globals();
    for name in HIDDEN_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }
    globals.set("KEYS", lua.create_sequence_from(byte_strings(lua, &run.keys)?)?)?;
    globals.set("ARGV", lua.create_sequence_from(byte_strings(lua, &run.args)?)?)?;

    let api = create_api_table(lua, context, run.read_only)?;
    globals.set("server", api.clone())?;
    globals.set("redis", api)?;

    lua.load(run.body).eval::<Value<'lua>>()
}

fn byte_strings<'lua>(lua: &'lua Lua, values: &[Bytes]) -> mlua::Result<Vec<mlua::String<'lua>>> {
    values.iter().map(|v| lua.create_string(&v[..])).collect()
}

fn create_api_table(
    lua: &Lua,
    context: Arc<Mutex<ScriptContext>>,
    read_only: bool,
) -> mlua::Result<mlua::Table<'_>> {
    let table = lua.create_table()?;

    let ctx_call = Arc::clone(&context);
    let call_fn = lua.create_function(move |lua, args: mlua::Variadic<Value>| {
        let argv = command_args(args)?;
        let outcome = commands::execute(&mut *ctx_call.lock(), &argv, read_only);
        match outcome {
            Ok(reply) => reply_to_lua(lua, reply),
            Err(e) => Err(mlua::Error::RuntimeError(e.to_string())),
        }
    })?;
    table.set("call", call_fn)?;

    let ctx_pcall = Arc::clone(&context);
    let pcall_fn = lua.create_function(move |lua, args: mlua::Variadic<Value>| {
        let argv = command_args(args)?;
        let outcome = commands::execute(&mut *ctx_pcall.lock(), &argv, read_only);
        match outcome {
            Ok(reply) => reply_to_lua(lua, reply),
            Err(e) => error_table(lua, &e.to_string()),
        }
    })?;
    table.set("pcall", pcall_fn)?;

    let error_reply_fn = lua.create_function(|lua, msg: String| error_table(lua, &msg))?;
    table.set("error_reply", error_reply_fn)?;

    let status_reply_fn = lua.create_function(|lua, msg: String| {
        let t = lua.create_table()?;
        t.set("ok", msg)?;
        Ok(Value::Table(t))
    })?;
    table.set("status_reply", status_reply_fn)?;

    let sha1hex_fn =
        lua.create_function(|_, body: String| Ok(crate::script::identity::sha1_hex(&body)))?;
    table.set("sha1hex", sha1hex_fn)?;

    Ok(table)
}

fn error_table<'lua>(lua: &'lua Lua, msg: &str) -> mlua::Result<Value<'lua>> {
    let t = lua.create_table()?;
    t.set("err", msg)?;
    Ok(Value::Table(t))
}

/// Converts `server.call` arguments to command tokens.
fn command_args(args: mlua::Variadic<Value<'_>>) -> mlua::Result<Vec<Bytes>> {
    if args.is_empty() {
        return Err(mlua::Error::RuntimeError(
            "Please specify at least one argument for this call".to_string(),
        ));
    }
    args.iter()
        .map(|v| match v {
            Value::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Value::Integer(i) => Ok(Bytes::from(i.to_string())),
            Value::Number(n) => Ok(Bytes::from(n.to_string())),
            _ => Err(mlua::Error::RuntimeError(
                "Command arguments must be strings or integers".to_string(),
            )),
        })
        .collect()
}

/// Converts a command reply into the value a script sees.
///
/// Nil becomes `false` and status replies become `{ok = ...}` tables.
fn reply_to_lua(lua: &Lua, reply: Reply) -> mlua::Result<Value<'_>> {
    Ok(match reply {
        Reply::Nil => Value::Boolean(false),
        Reply::Int(i) => Value::Integer(i),
        Reply::Bulk(b) => Value::String(lua.create_string(&b[..])?),
        Reply::Status(s) => {
            let t = lua.create_table()?;
            t.set("ok", s)?;
            Value::Table(t)
        }
        Reply::Array(items) => {
            let t = lua.create_table()?;
            for (i, item) in items.into_iter().enumerate() {
                t.raw_set(i + 1, reply_to_lua(lua, item)?)?;
            }
            Value::Table(t)
        }
    })
}

/// Converts a script's return value into a reply.
fn lua_to_reply(value: Value<'_>) -> Outcome {
    let lua_err = |e: mlua::Error| Error::server(format!("ERR Error running script: {}", e));
    match value {
        Value::Nil | Value::Boolean(false) => Ok(Reply::Nil),
        Value::Boolean(true) => Ok(Reply::Int(1)),
        Value::Integer(i) => Ok(Reply::Int(i)),
        Value::Number(n) => Ok(Reply::Int(n as i64)),
        Value::String(s) => Ok(Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))),
        Value::Table(t) => {
            if let Some(err) = t.raw_get::<_, Option<String>>("err").map_err(lua_err)? {
                return Err(Error::server(err));
            }
            if let Some(status) = t.raw_get::<_, Option<String>>("ok").map_err(lua_err)? {
                return Ok(Reply::Status(status));
            }
            let mut items = Vec::new();
            for item in t.sequence_values::<Value>() {
                items.push(lua_to_reply(item.map_err(lua_err)?)?);
            }
            Ok(Reply::Array(items))
        }
        _ => Ok(Reply::Nil),
    }
}

/// Innermost message of a Lua error, without callback tracebacks.
fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_skiplist::SkipMap;

    fn setup() -> (Arc<SkipMap<Bytes, Bytes>>, LuaRunner) {
        (Arc::new(SkipMap::new()), LuaRunner::new(1000))
    }

    fn run<'a>(body: &'a str, keys: &[&str], args: &[&str]) -> ScriptRun<'a> {
        ScriptRun {
            body,
            keys: keys.iter().map(|k| Bytes::copy_from_slice(k.as_bytes())).collect(),
            args: args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())).collect(),
            read_only: false,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_runner_returns_keys_and_args() {
        let (ks, runner) = setup();
        let reply = runner
            .run(
                run("return {KEYS[1], KEYS[2], ARGV[1], ARGV[2]}", &["k1", "k2"], &["a1", "a2"]),
                ScriptContext::new(ks),
            )
            .unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::from("k1"), Reply::from("k2"), Reply::from("a1"), Reply::from("a2")])
        );
    }

    #[test]
    fn test_runner_value_conversions() {
        let (ks, runner) = setup();
        let cases = [
            ("return nil", Reply::Nil),
            ("return false", Reply::Nil),
            ("return true", Reply::Int(1)),
            ("return 3.9", Reply::Int(3)),
            ("return {ok='FINE'}", Reply::status("FINE")),
            ("return {1, 2, nil, 4}", Reply::Array(vec![Reply::Int(1), Reply::Int(2)])),
        ];
        for (body, expected) in cases {
            let reply = runner.run(run(body, &[], &[]), ScriptContext::new(Arc::clone(&ks)));
            assert_eq!(reply.unwrap(), expected, "{}", body);
        }

        let err = runner.run(run("return {err='MYERR bad'}", &[], &[]), ScriptContext::new(ks));
        assert_eq!(err.unwrap_err().to_string(), "MYERR bad");
    }

    #[test]
    fn test_runner_commits_on_success() {
        let (ks, runner) = setup();
        let reply = runner
            .run(
                run("server.call('SET', KEYS[1], ARGV[1]) return server.call('GET', KEYS[1])", &["k"], &["v"]),
                ScriptContext::new(Arc::clone(&ks)),
            )
            .unwrap();
        assert_eq!(reply, Reply::from("v"));
        assert_eq!(ks.get(b"k".as_slice()).unwrap().value(), &Bytes::from_static(b"v"));
    }

    #[test]
    fn test_runner_rolls_back_on_error() {
        let (ks, runner) = setup();
        let err = runner
            .run(
                run("redis.call('SET', 'k', 'v') error('boom')", &[], &[]),
                ScriptContext::new(Arc::clone(&ks)),
            )
            .unwrap_err();
        assert!(err.to_string().starts_with("ERR Error running script"));
        assert!(err.to_string().contains("boom"));
        assert!(ks.is_empty());
    }

    #[test]
    fn test_runner_read_only_rejects_writes() {
        let (ks, runner) = setup();
        let mut ro = run("return server.call('SET', 'k', 'v')", &[], &[]);
        ro.read_only = true;
        let err = runner.run(ro, ScriptContext::new(Arc::clone(&ks))).unwrap_err();
        assert!(err.to_string().contains("not allowed from read-only scripts"));
        assert!(ks.is_empty());

        let mut ro = run("return server.pcall('SET', 'k', 'v')", &[], &[]);
        ro.read_only = true;
        let err = runner.run(ro, ScriptContext::new(ks)).unwrap_err();
        assert_eq!(err.to_string(), commands::READ_ONLY_SCRIPT_ERROR);
    }

    #[test]
    fn test_runner_timeout() {
        let (ks, runner) = setup();
        let mut forever = run("while true do end", &[], &[]);
        forever.timeout = Some(Duration::from_millis(50));
        let err = runner.run(forever, ScriptContext::new(ks)).unwrap_err();
        assert_eq!(err.to_string(), SCRIPT_TIMEOUT_ERROR);
    }

    #[test]
    fn test_runner_is_sandboxed() {
        let (ks, runner) = setup();
        let reply = runner.run(
            run("return os == nil and io == nil and dofile == nil and loadfile == nil", &[], &[]),
            ScriptContext::new(ks.clone()),
        );
        assert_eq!(reply.unwrap(), Reply::Int(1));

        let err = runner.run(run("return dofile('/etc/hostname')", &[], &[]), ScriptContext::new(ks)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Script);
        assert!(err.to_string().contains("dofile"));
    }

    #[test]
    fn test_runner_compile() {
        let runner = LuaRunner::new(1000);
        assert!(runner.compile("return 1").is_ok());
        let err = runner.compile("return (").unwrap_err();
        assert!(err.to_string().starts_with("ERR Error compiling script:"));
    }

    #[test]
    fn test_runner_syntax_error() {
        let (ks, runner) = setup();
        let err = runner.run(run("return (", &[], &[]), ScriptContext::new(ks)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Script);
    }
}
