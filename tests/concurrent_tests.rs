// Concurrent Access Tests for kvlua
// These tests verify that one Script value can be shared by many threads

use kvlua::{Context, ExecGroup, LocalServer, Reply, Script};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Test one script executed from many threads against one server
#[test]
fn test_concurrent_exec_shared_script() {
    env_logger::try_init().ok();
    let server = Arc::new(LocalServer::new());
    let script = Arc::new(Script::new("server.call('SET', KEYS[1], ARGV[1]) return ARGV[1]"));

    let num_threads = 8;
    let calls_per_thread = 50;
    let barrier = Arc::new(Barrier::new(num_threads));

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let server = Arc::clone(&server);
        let script = Arc::clone(&script);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let ctx = Context::background();
            for i in 0..calls_per_thread {
                let key = format!("thread_{}_key_{}", thread_id, i);
                let value = format!("thread_{}_value_{}", thread_id, i);
                let reply = script.exec(&ctx, &*server, &[key.as_str()], &[value.as_str()]).unwrap();
                assert_eq!(reply, Reply::from(value.as_str()));
            }
        }));
    }

    // Wait for all threads to complete
    for handle in handles {
        handle.join().unwrap();
    }

    for thread_id in 0..num_threads {
        for i in 0..calls_per_thread {
            let key = format!("thread_{}_key_{}", thread_id, i);
            let expected = format!("thread_{}_value_{}", thread_id, i);
            assert_eq!(server.get(key.as_bytes()).unwrap(), expected.as_bytes());
        }
    }

    // Each thread can miss at most once before the body is cached.
    let stats = server.stats();
    assert!(stats.cache_misses <= num_threads as u64);
    assert_eq!(stats.scripts_run, (num_threads * calls_per_thread) as u64);
}

/// Test scripts are atomic: concurrent increments never lose updates
#[test]
fn test_concurrent_increments_are_atomic() {
    let server = LocalServer::new();
    let incr = Script::new(
        "local v = tonumber(server.call('GET', KEYS[1]) or '0') + 1
         server.call('SET', KEYS[1], tostring(v))
         return v",
    );
    let completed = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                let ctx = Context::background();
                for _ in 0..100 {
                    incr.exec(&ctx, &server, &["counter"], &[] as &[&str]).unwrap();
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(completed.load(Ordering::Relaxed), 400);
    assert_eq!(server.get(b"counter").unwrap(), "400".as_bytes());
}

/// Test concurrent batches keep their own ordering
#[test]
fn test_concurrent_batches_preserve_order() {
    let server = LocalServer::new();
    let echo = Script::read_only("return ARGV[1]");

    crossbeam::scope(|s| {
        for thread_id in 0..4 {
            let (server, echo) = (&server, &echo);
            s.spawn(move |_| {
                let groups: Vec<ExecGroup> = (0..20)
                    .map(|i| ExecGroup::new([format!("k{}", i)], [format!("{}-{}", thread_id, i)]))
                    .collect();
                let outcomes = echo.exec_multi(&Context::background(), server, &groups);
                for (i, outcome) in outcomes.iter().enumerate() {
                    let expected = format!("{}-{}", thread_id, i);
                    assert_eq!(outcome.as_ref().unwrap(), &Reply::from(expected.as_str()));
                }
            });
        }
    })
    .unwrap();
}
