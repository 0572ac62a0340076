use std::thread;
use std::time::Duration;

use strand::{Error, EventLoop, LoopBuilder};

#[strand::test]
async fn test_spawn_blocking_returns_value() {
    let handle = strand::Handle::current();
    let caller = thread::current().id();

    let (value, worker) = handle
        .spawn_blocking(|| (21 * 2, thread::current().id()))
        .await
        .expect("Offload failed");

    assert_eq!(value, 42);
    assert_ne!(worker, caller);
}

#[strand::test]
async fn test_spawn_blocking_panic_is_reported() {
    let handle = strand::Handle::current();

    let result = handle
        .spawn_blocking(|| -> u32 { panic!("worker exploded") })
        .await;

    match result {
        Err(Error::Offload(message)) => assert!(message.contains("worker exploded")),
        other => panic!("unexpected result: {other:?}"),
    }

    let after = handle.spawn_blocking(|| 1).await.expect("Offload failed");
    assert_eq!(after, 1);
}

#[test]
fn test_loop_keeps_serving_while_jobs_run() {
    let event_loop = LoopBuilder::new()
        .offload_threads(2)
        .build()
        .expect("Failed to build event loop");
    let handle = event_loop.handle();

    let results = event_loop.block_on(async move {
        let jobs: Vec<_> = (0..8u64)
            .map(|i| {
                let handle = handle.clone();
                strand::spawn(async move {
                    handle
                        .spawn_blocking(move || {
                            thread::sleep(Duration::from_millis(5));
                            i * i
                        })
                        .await
                })
            })
            .collect();

        let ticks = strand::spawn(async {
            let mut ticks = 0;
            for _ in 0..5 {
                strand::time::sleep(Duration::from_millis(1)).await;
                ticks += 1;
            }
            ticks
        });

        let mut results = Vec::new();
        for job in jobs {
            results.push(job.await.expect("Task failed").expect("Offload failed"));
        }

        assert_eq!(ticks.await.expect("Task failed"), 5);
        results
    });

    assert_eq!(results, (0..8u64).map(|i| i * i).collect::<Vec<_>>());
}

#[test]
fn test_resolve_literal_and_localhost() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let (literal, local) = event_loop.block_on(async move {
        let literal = strand::net::resolve(&handle, "10.1.2.3").await;
        let local = strand::net::resolve(&handle, "localhost").await;
        (literal, local)
    });

    assert_eq!(literal.expect("Failed to resolve"), "10.1.2.3".parse::<std::net::IpAddr>().unwrap());
    assert!(local.expect("Failed to resolve").is_loopback());
}

#[test]
fn test_queued_job_fails_when_loop_is_dropped() {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll, Waker};

    let event_loop = LoopBuilder::new()
        .offload_threads(1)
        .build()
        .expect("Failed to build event loop");
    let handle = event_loop.handle();

    let mut running = handle.spawn_blocking(|| {
        thread::sleep(Duration::from_millis(50));
        1
    });
    thread::sleep(Duration::from_millis(10));
    let mut queued = handle.spawn_blocking(|| 2);

    drop(event_loop);

    let mut cx = Context::from_waker(Waker::noop());
    assert!(matches!(Pin::new(&mut running).poll(&mut cx), Poll::Ready(Ok(1))));
    match Pin::new(&mut queued).poll(&mut cx) {
        Poll::Ready(Err(Error::Offload(message))) => assert!(message.contains("shut down")),
        other => panic!("unexpected result: {other:?}"),
    }
}
