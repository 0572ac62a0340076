use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Poll;
use std::time::{Duration, Instant};

use strand::time::sleep;
use strand::{Error, EventLoop, Handle, LoopBuilder, TaskState, yield_now};

#[strand::test]
async fn test_spawn_and_join() {
    let task = strand::spawn(async { 40 + 2 });
    assert_eq!(task.await.expect("Task failed"), 42);
}

#[strand::test]
async fn test_panicking_task_is_isolated() {
    let failing = strand::spawn(async {
        panic!("task exploded");
    });
    let healthy = strand::spawn(async { "still running" });

    match failing.await {
        Err(Error::Panicked(message)) => assert!(message.contains("task exploded")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(healthy.await.expect("Task failed"), "still running");
}

#[strand::test]
async fn test_join_handle_state() {
    let task = strand::spawn(async {
        sleep(Duration::from_millis(10)).await;
    });
    assert!(!task.is_finished());

    sleep(Duration::from_millis(1)).await;
    assert!(matches!(task.state(), TaskState::Suspended));

    sleep(Duration::from_millis(20)).await;
    assert!(task.is_finished());
    assert!(matches!(task.state(), TaskState::Completed));
    task.await.expect("Task failed");
}

#[strand::test]
async fn test_yield_now_interleaves_tasks() {
    let log = Rc::new(RefCell::new(Vec::new()));

    let tasks: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let log = log.clone();
            strand::spawn(async move {
                for step in 0..3 {
                    log.borrow_mut().push(format!("{name}{step}"));
                    yield_now().await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("Task failed");
    }

    assert_eq!(*log.borrow(), vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
}

#[strand::test]
async fn test_sleeps_wake_in_deadline_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let start = Instant::now();

    let tasks: Vec<_> = [30u64, 10, 20]
        .into_iter()
        .map(|ms| {
            let log = log.clone();
            strand::spawn(async move {
                sleep(Duration::from_millis(ms)).await;
                log.borrow_mut().push(ms);
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("Task failed");
    }

    assert_eq!(*log.borrow(), vec![10, 20, 30]);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_dropped_sleep_does_not_keep_loop_alive() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let start = Instant::now();
    drop(handle.sleep(Duration::from_secs(60)));
    event_loop.block_on(async {
        let mut long = sleep(Duration::from_secs(60));
        std::future::poll_fn(|cx| {
            assert!(Pin::new(&mut long).poll(cx).is_pending());
            Poll::Ready(())
        })
        .await;

        sleep(Duration::from_millis(5)).await;
        drop(long);
    });
    event_loop.run().expect("Event loop failed");

    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_run_returns_when_out_of_work() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let log = Rc::new(RefCell::new(Vec::new()));

    for ms in [5u64, 1] {
        let log = log.clone();
        event_loop.spawn(async move {
            sleep(Duration::from_millis(ms)).await;
            log.borrow_mut().push(ms);
        });
    }

    event_loop.run().expect("Event loop failed");
    assert_eq!(*log.borrow(), vec![1, 5]);
}

#[test]
fn test_stop_interrupts_run() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();

    let stopper = handle.clone();
    let ticker = event_loop.spawn(async move {
        loop {
            sleep(Duration::from_millis(2)).await;
            stopper.stop();
        }
    });

    event_loop.run().expect("Event loop failed");
    assert!(!ticker.is_finished());
}

#[test]
fn test_handle_outlives_loop() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle: Handle = event_loop.handle();
    let pending = handle.spawn(async {
        sleep(Duration::from_secs(60)).await;
    });

    assert!(!handle.is_closed());
    drop(event_loop);
    assert!(handle.is_closed());

    assert!(matches!(
        poll_now(pending),
        Some(Err(Error::LoopClosed))
    ));
    assert!(Handle::try_current().is_none());
}

/// Polls a future once with a no-op waker.
fn poll_now<F: Future + Unpin>(mut future: F) -> Option<F::Output> {
    use std::task::{Context, Waker};

    let mut cx = Context::from_waker(Waker::noop());
    match Pin::new(&mut future).poll(&mut cx) {
        Poll::Ready(value) => Some(value),
        Poll::Pending => None,
    }
}

#[test]
fn test_default_loop_runs_spawned_tasks() {
    let handle = strand::default_loop().expect("Failed to create default loop");
    let again = strand::default_loop().expect("Failed to create default loop");
    let log = Rc::new(RefCell::new(Vec::new()));

    let recorded = log.clone();
    let task = handle.spawn(async move {
        sleep(Duration::from_millis(1)).await;
        recorded.borrow_mut().push("done");
        7
    });

    strand::run_default_loop().expect("Default loop failed");

    assert!(task.is_finished());
    assert_eq!(*log.borrow(), vec!["done"]);
    assert!(!again.is_closed());
}

#[test]
fn test_builder_configuration() {
    let event_loop = LoopBuilder::new()
        .offload_threads(1)
        .read_chunk_size(16)
        .initial_buffer_capacity(8)
        .listen_backlog(4)
        .event_capacity(8)
        .build()
        .expect("Failed to build event loop");

    let answer = event_loop.block_on(async { 6 * 7 });
    assert_eq!(answer, 42);
}
