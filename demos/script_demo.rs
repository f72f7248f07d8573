//! Example: Scripts Invoked by Identity
//!
//! This example runs a transfer script against the in-process server and
//! shows how the first call falls back to the full body while later calls,
//! and batches, only send the SHA-1 identity.

use kvlua::{Client, CommandBuilder, Context, ExecGroup, LocalServer, Script};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let server = LocalServer::new();
    let ctx = Context::background();

    println!("=== Scripts Invoked by Identity ===\n");

    for (account, balance) in [("alice", "1000"), ("bob", "500"), ("carol", "0")] {
        let cmd = CommandBuilder::new()
            .arg("SET")
            .arg(format!("account:{}", account))
            .arg(balance)
            .build();
        server.execute(&ctx, cmd)?;
    }

    let transfer = Script::new(
        r#"
        local from = tonumber(server.call('GET', KEYS[1]))
        local to = tonumber(server.call('GET', KEYS[2]))
        local amount = tonumber(ARGV[1])
        if from < amount then
            return server.error_reply('ERR insufficient balance')
        end
        server.call('SET', KEYS[1], tostring(from - amount))
        server.call('SET', KEYS[2], tostring(to + amount))
        return from - amount
        "#,
    );
    println!("Script identity: {}", transfer.sha1());

    // Example 1: first call misses the server cache
    println!("\nExample 1: first transfer");
    println!("-------------------------");
    let left = transfer.exec(&ctx, &server, &["account:alice", "account:bob"], &["200"])?;
    println!("Alice has {} left", left.to_string_value()?);
    println!("Server stats: {:?}", server.stats());

    // Example 2: the identity is now cached
    println!("\nExample 2: second transfer");
    println!("--------------------------");
    server.reset_stats();
    let left = transfer.exec(&ctx, &server, &["account:bob", "account:carol"], &["100"])?;
    println!("Bob has {} left", left.to_string_value()?);
    println!("Server stats: {:?}", server.stats());

    // Example 3: a batch where one group fails on its own
    println!("\nExample 3: batch of transfers");
    println!("-----------------------------");
    server.reset_stats();
    let groups = vec![
        ExecGroup::new(["account:alice", "account:carol"], ["50"]),
        ExecGroup::new(["account:carol", "account:alice"], ["10000"]),
        ExecGroup::new(["account:bob", "account:alice"], ["25"]),
    ];
    for (i, outcome) in transfer.exec_multi(&ctx, &server, &groups).into_iter().enumerate() {
        match outcome {
            Ok(reply) => println!("  transfer {}: ok, {} left", i, reply.to_string_value()?),
            Err(e) => println!("  transfer {}: failed ({})", i, e),
        }
    }
    println!("Server stats: {:?}", server.stats());

    Ok(())
}
