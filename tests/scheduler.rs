//! TickScheduler integration tests.
//!
//! These run on the real tick thread, so assertions wait with generous
//! deadlines instead of expecting exact tick counts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use frametap::{
    ExtractorOptions, FrameEvent, PeriodicScheduler, PlaybackSession, Position, SessionHandle,
    SessionRegistry, TestPattern, TickScheduler, TickTask,
};

fn counting_task() -> (Arc<AtomicUsize>, TickTask) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    let task: TickTask = Arc::new(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    (count, task)
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// ── Ticking ──────────────────────────────────────────────────────

#[test]
fn scheduled_task_ticks_repeatedly() {
    let scheduler = TickScheduler::new().expect("Failed to start tick thread");
    let (count, task) = counting_task();
    let _tick = scheduler.schedule(Duration::from_millis(5), task).unwrap();

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 3));
}

#[test]
fn cancelled_task_stops_ticking() {
    let scheduler = TickScheduler::new().expect("Failed to start tick thread");
    let (count, task) = counting_task();
    let tick = scheduler.schedule(Duration::from_millis(5), task).unwrap();
    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 1));

    tick.cancel();
    // Allow an in-flight tick to finish.
    thread::sleep(Duration::from_millis(20));
    let settled = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), settled);
    assert!(wait_until(Duration::from_secs(1), || scheduler.active_tasks() == 0));
}

#[test]
fn tasks_share_one_thread() {
    let scheduler = TickScheduler::new().expect("Failed to start tick thread");
    let names = Arc::new(Mutex::new(Vec::new()));
    let mut ticks = Vec::new();
    for _ in 0..4 {
        let names = Arc::clone(&names);
        let task: TickTask = Arc::new(move || {
            let name = thread::current().name().map(str::to_owned);
            names.lock().unwrap().push(name);
        });
        ticks.push(scheduler.schedule(Duration::from_millis(5), task).unwrap());
    }

    assert!(wait_until(Duration::from_secs(2), || names.lock().unwrap().len() >= 8));
    let names = names.lock().unwrap();
    assert!(names.iter().all(|name| name.as_deref() == Some("frametap-tick")));
}

#[test]
fn panicking_task_does_not_stop_others() {
    let scheduler = TickScheduler::new().expect("Failed to start tick thread");
    let panicking: TickTask = Arc::new(|| panic!("tick failure"));
    let _bad = scheduler.schedule(Duration::from_millis(5), panicking).unwrap();
    let (count, task) = counting_task();
    let _good = scheduler.schedule(Duration::from_millis(5), task).unwrap();

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 5));
}

#[test]
fn late_ticks_are_coalesced() {
    let scheduler = TickScheduler::new().expect("Failed to start tick thread");
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    // The first tick stalls for ten intervals; the missed ones must not be
    // replayed in a burst afterwards.
    let stalling: TickTask = Arc::new(move || {
        if inner.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(100));
        }
    });
    let tick = scheduler.schedule(Duration::from_millis(10), stalling).unwrap();

    thread::sleep(Duration::from_millis(160));
    tick.cancel();
    let observed = count.load(Ordering::SeqCst);
    assert!(observed >= 2, "expected some ticks, saw {observed}");
    assert!(observed <= 10, "missed ticks were replayed: {observed}");
}

#[test]
fn dropping_scheduler_stops_its_thread() {
    let scheduler = TickScheduler::with_thread_name("frametap-test").unwrap();
    let (count, task) = counting_task();
    let tick = scheduler.schedule(Duration::from_millis(5), task).unwrap();
    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 1));

    drop(scheduler);
    let settled = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(count.load(Ordering::SeqCst), settled);

    // Cancelling after shutdown is harmless.
    tick.cancel();
}

// ── End to end ───────────────────────────────────────────────────

#[test]
fn registry_on_tick_thread_delivers_each_frame_once() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = Arc::clone(&events);
        Arc::new(move |event: FrameEvent| events.lock().unwrap().push(event))
    };
    let registry = SessionRegistry::new(
        Arc::new(TickScheduler::new().unwrap()),
        sink,
        ExtractorOptions::new().with_frames_per_second(200.0),
    );

    let session = Arc::new(PlaybackSession::new());
    registry.register(SessionHandle(11), session.clone()).unwrap();

    let pattern = TestPattern::new(16, 16);
    for index in 0..3u64 {
        session.publish(Position::from_millis(index * 40), pattern.frame(index));
        let expected = index as usize + 1;
        assert!(
            wait_until(Duration::from_secs(2), || events.lock().unwrap().len() >= expected),
            "frame {index} was not delivered"
        );
    }

    // No new frames: nothing more arrives.
    thread::sleep(Duration::from_millis(50));
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    let positions: Vec<_> = events.iter().map(|event| event.position).collect();
    assert_eq!(
        positions,
        vec![Position::from_millis(0), Position::from_millis(40), Position::from_millis(80)]
    );
    drop(events);

    registry.unregister(SessionHandle(11)).unwrap();
    assert_eq!(session.attached_outputs(), 0);
}
