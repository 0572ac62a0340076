use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use strand::time::{Ticker, Timer, sleep};
use strand::{Error, EventLoop, Handle, Result};

type Log = Rc<RefCell<Vec<String>>>;

/// Sleeps until `cond` holds, giving up after about a second.
async fn wait_for(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    cond()
}

async fn three_ticks(ticker: Ticker, (log, label): (Log, &'static str)) -> Result<()> {
    for i in 0..3 {
        log.borrow_mut().push(format!("{label} {i}"));
        if i < 2 {
            ticker.next().await?;
        }
    }
    Ok(())
}

#[test]
fn test_repeating_timer_runs_bound_task() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let timer = Timer::new(
        &handle,
        Duration::from_millis(5),
        Duration::from_millis(10),
        three_ticks,
        (log.clone(), "tick"),
    );

    let started = Instant::now();
    timer.start().expect("Failed to start timer");
    assert!(timer.is_active());

    let observed = log.clone();
    let finished = event_loop.block_on(async move {
        wait_for(|| observed.borrow().len() == 3).await;
        sleep(Duration::from_millis(5)).await;
        (timer.is_active(), timer.start())
    });

    assert!(started.elapsed() >= Duration::from_millis(25));
    assert_eq!(*log.borrow(), vec!["tick 0", "tick 1", "tick 2"]);
    assert!(!finished.0);
    assert!(matches!(finished.1, Err(Error::Closed)));
}

async fn stamp_ticks(ticker: Ticker, (stamps, label): (Rc<RefCell<Vec<Instant>>>, Log)) -> Result<()> {
    for i in 0..3 {
        stamps.borrow_mut().push(Instant::now());
        label.borrow_mut().push(format!("tick {i}"));

        if i < 2 {
            ticker.next().await?;
        }
    }
    Ok(())
}

#[test]
fn test_zero_first_delay_fires_immediately_then_spaces_ticks() {
    const INTERVAL: Duration = Duration::from_millis(100);

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let log: Log = Rc::default();

    let timer = Timer::new(
        &event_loop.handle(),
        Duration::ZERO,
        INTERVAL,
        stamp_ticks,
        (stamps.clone(), log.clone()),
    );

    let started = Instant::now();
    timer.start().expect("Failed to start timer");
    event_loop.run().expect("Event loop failed");

    let stamps = stamps.borrow();
    assert_eq!(*log.borrow(), vec!["tick 0", "tick 1", "tick 2"]);
    assert!(stamps[0] - started < INTERVAL / 2);
    assert!(stamps[1] - stamps[0] >= INTERVAL);
    assert!(stamps[2] - stamps[1] >= INTERVAL);
    assert!(!timer.is_active());
}

async fn park(ticker: Ticker, log: Log) -> Result<()> {
    loop {
        log.borrow_mut().push("fired".into());

        if let Err(e) = ticker.next().await {
            log.borrow_mut().push(format!("next failed: {e}"));
            return Err(e);
        }
    }
}

#[test]
fn test_one_shot_timer_rearms_on_start() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let timer = Timer::new(&handle, Duration::from_millis(5), Duration::ZERO, park, log.clone());
    timer.start().expect("Failed to start timer");

    let observed = log.clone();
    event_loop.block_on(async move {
        assert!(wait_for(|| observed.borrow().len() == 1).await);
        assert!(!timer.is_active());

        sleep(Duration::from_millis(30)).await;
        assert_eq!(observed.borrow().len(), 1);

        timer.start().expect("Failed to restart timer");
        assert!(wait_for(|| observed.borrow().len() == 2).await);

        timer.close();
        assert!(wait_for(|| observed.borrow().len() == 3).await);
    });

    assert_eq!(
        *log.borrow(),
        vec!["fired", "fired", "next failed: registration closed"]
    );
}

#[test]
fn test_stopped_timer_does_not_fire() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let handle = event_loop.handle();
    let log: Log = Rc::default();

    let timer = Timer::new(
        &handle,
        Duration::from_millis(10),
        Duration::from_millis(10),
        park,
        log.clone(),
    );
    timer.start().expect("Failed to start timer");
    timer.stop();
    assert!(!timer.is_active());

    let observed = log.clone();
    event_loop.block_on(async move {
        sleep(Duration::from_millis(40)).await;
        assert!(observed.borrow().is_empty());

        timer.start().expect("Failed to restart timer");
        assert!(wait_for(|| observed.borrow().len() >= 2).await);

        timer.stop();
        sleep(Duration::from_millis(1)).await;
        let seen = observed.borrow().len();
        sleep(Duration::from_millis(40)).await;
        assert_eq!(observed.borrow().len(), seen);

        timer.close();
    });
}

#[test]
fn test_closed_timer_never_spawns() {
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let log: Log = Rc::default();

    let timer = Timer::new(
        &event_loop.handle(),
        Duration::ZERO,
        Duration::ZERO,
        park,
        log.clone(),
    );
    timer.close();

    assert!(matches!(timer.start(), Err(Error::Closed)));
    event_loop.run().expect("Event loop failed");
    assert!(log.borrow().is_empty());
}

#[test]
fn test_timer_after_loop_dropped() {
    let handle: Handle = EventLoop::new()
        .expect("Failed to create event loop")
        .handle();
    let log: Log = Rc::default();

    let timer = Timer::new(&handle, Duration::ZERO, Duration::ZERO, park, log);
    assert!(matches!(timer.start(), Err(Error::LoopClosed)));
}
