//! End-to-end behavior of the bus: ordering, fan-out, disposal, panics and waits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use msgbus::{Bus, BusError, HandlerPanic, WaitOptions, handler};
use tokio_util::sync::CancellationToken;

fn collector<T>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static)
where
    T: Clone + Send + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |msg: &T| sink.lock().unwrap().push(msg.clone()))
}

#[test]
fn single_worker_preserves_publish_order() {
    let bus = Bus::new(1).unwrap();
    let (seen, h) = collector::<String>();
    bus.subscribe(h).unwrap();

    for s in ["a", "b", "c"] {
        bus.publish(s.to_string()).unwrap();
    }
    bus.dispose();

    assert_eq!(*seen.lock().unwrap(), ["a", "b", "c"]);
}

#[test]
fn concurrent_publishers_lose_and_duplicate_nothing() {
    let bus = Arc::new(Bus::new(4).unwrap());
    let (seen, h) = collector::<u32>();
    bus.subscribe(h).unwrap();

    let barrier = Arc::new(Barrier::new(10));
    let publishers: Vec<_> = (0..10u32)
        .map(|t| {
            let bus = Arc::clone(&bus);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..100u32 {
                    bus.publish(t * 100 + i).unwrap();
                }
            })
        })
        .collect();
    for p in publishers {
        p.join().unwrap();
    }
    bus.dispose();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1000);
    let unique: HashSet<u32> = seen.iter().copied().collect();
    assert_eq!(unique.len(), 1000);
}

#[test]
fn dispose_delivers_already_published_messages() {
    let bus = Bus::new(2).unwrap();
    let (seen, h) = collector::<&'static str>();
    bus.subscribe(move |m: &&'static str| {
        thread::sleep(Duration::from_millis(20));
        h(m);
    })
    .unwrap();

    bus.publish("m1").unwrap();
    bus.publish("m2").unwrap();
    bus.dispose();

    let mut got = seen.lock().unwrap().clone();
    got.sort_unstable();
    assert_eq!(got, ["m1", "m2"]);
}

#[test]
fn throwing_handler_does_not_starve_sibling() {
    let panics = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&panics);
    let bus = Bus::builder()
        .with_workers(1)
        .with_panic_hook(move |_: &HandlerPanic| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    bus.subscribe(|_: &u64| panic!("always fails")).unwrap();
    let (seen, h) = collector::<u64>();
    bus.subscribe(h).unwrap();

    for i in 0..25u64 {
        bus.publish(i).unwrap();
    }
    bus.dispose();

    assert_eq!(*seen.lock().unwrap(), (0..25).collect::<Vec<_>>());
    assert_eq!(panics.load(Ordering::SeqCst), 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispose_fails_pending_wait() {
    let bus = Bus::new(1).unwrap();
    let wait = bus.next_message::<u32>().unwrap();

    bus.dispose();

    assert_eq!(wait.await.unwrap_err(), BusError::Disposed);
    assert_eq!(bus.subscriber_count::<u32>(), 0);
}

#[test]
fn zero_workers_is_invalid_configuration() {
    assert!(matches!(
        Bus::new(0),
        Err(BusError::InvalidWorkerCount { workers: 0 })
    ));
}

#[test]
fn broadcast_invokes_every_handler_exactly_once() {
    let bus = Bus::new(3).unwrap();
    let counters: Vec<Arc<AtomicUsize>> = (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for c in &counters {
        let c = Arc::clone(c);
        bus.subscribe(move |_: &i32| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    for i in 0..40 {
        bus.publish(i).unwrap();
    }
    bus.dispose();

    for c in &counters {
        assert_eq!(c.load(Ordering::SeqCst), 40);
    }
}

#[test]
fn unsubscribed_handler_sees_nothing_further() {
    let bus = Bus::new(1).unwrap();
    let (gone_seen, gone) = collector::<u8>();
    let (kept_seen, kept) = collector::<u8>();
    let gone = handler(gone);
    bus.subscribe_handler(gone.clone(), None).unwrap();
    bus.subscribe(kept).unwrap();

    bus.publish(1u8).unwrap();
    // Wait for the first job so the removal below only affects later publishes.
    while bus.pending_jobs() > 0 || kept_seen.lock().unwrap().is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(bus.unsubscribe(&gone));
    bus.publish(2u8).unwrap();
    bus.dispose();

    assert_eq!(*gone_seen.lock().unwrap(), [1]);
    assert_eq!(*kept_seen.lock().unwrap(), [1, 2]);
}

#[test]
fn queued_job_keeps_its_snapshot() {
    let bus = Bus::new(1).unwrap();
    let gate = Arc::new(Barrier::new(2));

    let blocker = Arc::clone(&gate);
    bus.subscribe(move |_: &()| {
        blocker.wait();
    })
    .unwrap();
    let (seen, h) = collector::<u16>();
    let late = handler(h);
    bus.subscribe_handler(late.clone(), None).unwrap();

    bus.publish(()).unwrap(); // occupies the only worker
    bus.publish(9u16).unwrap(); // snapshot includes `late`
    assert!(bus.unsubscribe(&late));
    bus.publish(10u16).unwrap(); // nobody listens any more

    gate.wait();
    bus.dispose();
    assert_eq!(*seen.lock().unwrap(), [9]);
}

#[test]
fn operations_after_dispose_fail() {
    let bus = Bus::new(1).unwrap();
    bus.dispose();

    assert_eq!(bus.publish(0u8), Err(BusError::Disposed));
    assert_eq!(bus.subscribe(|_: &u8| {}).unwrap_err(), BusError::Disposed);
    assert_eq!(
        bus.wait_for_message(WaitOptions::<u8>::new()).unwrap_err(),
        BusError::Disposed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_resolves_with_first_accepted_message() {
    let bus = Bus::new(2).unwrap();
    let wait = bus
        .wait_for_message(WaitOptions::<i32>::new().filter(|n| {
            assert!(*n >= 0, "negative input");
            n % 5 == 0
        }))
        .unwrap();

    bus.publish(-5).unwrap(); // filter panics: ignored
    bus.publish(3).unwrap(); // rejected
    bus.publish(10).unwrap(); // accepted

    assert_eq!(*wait.await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_publish_resolves_many_waiters() {
    let bus = Bus::new(1).unwrap();
    let waits: Vec<_> = (0..4).map(|_| bus.next_message::<String>().unwrap()).collect();

    bus.publish("go".to_string()).unwrap();

    for w in waits {
        assert_eq!(w.await.unwrap().as_str(), "go");
    }
    assert_eq!(bus.subscriber_count::<String>(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_times_out_without_matching_message() {
    let bus = Bus::new(1).unwrap();
    let wait = bus
        .wait_for_message(
            WaitOptions::<u32>::new()
                .filter(|n| *n == 1)
                .timeout(Duration::from_millis(30)),
        )
        .unwrap();
    bus.publish(2u32).unwrap();

    let err = wait.await.unwrap_err();
    assert!(err.is_cancellation());
    assert!(matches!(err, BusError::TimedOut { .. }));
    assert_eq!(bus.subscriber_count::<u32>(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_honors_cancellation_token() {
    let bus = Bus::new(1).unwrap();
    let token = CancellationToken::new();
    let wait = bus
        .wait_for_message(WaitOptions::<u32>::new().cancel_on(token.clone()))
        .unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    assert_eq!(wait.await.unwrap_err(), BusError::Cancelled);
    canceller.await.unwrap();
    assert_eq!(bus.subscriber_count::<u32>(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_before_first_poll_is_observed() {
    let bus = Bus::new(1).unwrap();
    let wait = bus.next_message::<u8>().unwrap();
    bus.publish(3u8).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*wait.await.unwrap(), 3);
}
