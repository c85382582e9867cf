use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use flowgate::{
    Admission, AfterExecution, Decision, FakeClock, Outcome, QueueSet, QueueSetConfig,
    QueueSetFactory, RealClock, Ticket,
};

fn config(concurrency_limit: usize, queues: usize, queue_length_limit: usize, wait: Duration) -> QueueSetConfig {
    QueueSetConfig {
        concurrency_limit,
        desired_num_queues: queues,
        queue_length_limit,
        request_wait_limit: wait,
    }
}

fn fake_set(config: QueueSetConfig) -> (FakeClock, QueueSet) {
    let clock = FakeClock::new(Instant::now());
    let set = QueueSetFactory::new(Arc::new(clock.clone())).new_queue_set("scenario", config);
    (clock, set)
}

fn queued(set: &QueueSet, hash: u64) -> Ticket {
    match set.enqueue(hash, 1) {
        Admission::Queued(ticket) => ticket,
        other => panic!("expected the request to be queued, got {other:?}"),
    }
}

fn running(ticket: Ticket) -> AfterExecution {
    match ticket.try_outcome() {
        Ok(Decision::Execute(after)) => after,
        Ok(other) => panic!("expected execution, got {other:?}"),
        Err(_) => panic!("request is still queued"),
    }
}

#[test]
fn single_queue_overload_rejects_most_requests() {
    const REQUESTS: usize = 1000;
    let set = QueueSetFactory::new(Arc::new(RealClock))
        .new_queue_set("overload", config(1, 1, 1, Duration::ZERO));
    let executing = Arc::new(AtomicUsize::new(0));
    let max_executing = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(REQUESTS));

    let handles: Vec<_> = (0..REQUESTS)
        .map(|i| {
            let set = set.clone();
            let executing = executing.clone();
            let max_executing = max_executing.clone();
            let executed = executed.clone();
            let refused = refused.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                match set.wait(i as u64, 1) {
                    Outcome::Decided(Decision::Execute(after)) => {
                        let now = executing.fetch_add(1, Ordering::SeqCst) + 1;
                        max_executing.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        executing.fetch_sub(1, Ordering::SeqCst);
                        executed.fetch_add(1, Ordering::SeqCst);
                        after.finish();
                    }
                    Outcome::Decided(_) => {
                        refused.fetch_add(1, Ordering::SeqCst);
                    }
                    Outcome::Quiescent => panic!("queue set was never quiesced"),
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let executed = executed.load(Ordering::SeqCst);
    assert_eq!(max_executing.load(Ordering::SeqCst), 1);
    assert!(executed >= 1);
    assert!(executed < REQUESTS, "every request executed despite overload");
    assert_eq!(executed + refused.load(Ordering::SeqCst), REQUESTS);

    let snapshot = set.snapshot();
    assert_eq!(snapshot.executing, 0);
    assert_eq!(snapshot.packets_enqueued, 0);
    assert_eq!(snapshot.dispatched as usize, executed);
    assert_eq!(
        (snapshot.rejected + snapshot.timed_out) as usize,
        REQUESTS - executed
    );
}

#[test]
fn full_queue_rejects_without_blocking() {
    let (_clock, set) = fake_set(config(1, 1, 1, Duration::from_secs(60)));
    let first = running(queued(&set, 0));
    let second = queued(&set, 0);
    assert!(matches!(set.enqueue(0, 1), Admission::Rejected));
    // The blocking entry point returns immediately too.
    assert!(matches!(set.wait(0, 1), Outcome::Decided(Decision::Rejected)));
    assert_eq!(set.snapshot().rejected, 2);

    first.finish();
    running(second).finish();
    assert_eq!(set.snapshot().executing, 0);
}

#[test]
fn waiting_packet_times_out_on_next_arrival() {
    let (clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(5)));
    let holder = running(queued(&set, 0));
    let stale = queued(&set, 0);

    clock.advance(Duration::from_secs(6));
    // Nothing sweeps the queue until another request targets it.
    let stale = stale.try_outcome().expect_err("no sweep without an arrival");

    let fresh = queued(&set, 0);
    assert!(matches!(stale.try_outcome(), Ok(Decision::TimedOut)));
    assert_eq!(set.snapshot().timed_out, 1);
    assert_eq!(set.snapshot().packets_enqueued, 1);

    holder.finish();
    running(fresh).finish();
}

#[test]
fn packet_at_the_wait_limit_is_kept() {
    let (clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(5)));
    let holder = running(queued(&set, 0));
    let waiting = queued(&set, 0);
    clock.advance(Duration::from_secs(5));
    let _next = queued(&set, 0);
    let waiting = waiting.try_outcome().expect_err("packet exactly at the limit stays queued");
    holder.finish();
    running(waiting).finish();
}

#[test]
fn growing_queues_keeps_every_packet() {
    let (_clock, set) = fake_set(config(1, 1, 100, Duration::from_secs(600)));
    let holder = running(queued(&set, 0));
    let mut waiting: Vec<Ticket> = (0..5).map(|i| queued(&set, i)).collect();

    set.set_configuration(config(1, 4, 100, Duration::from_secs(600)));
    let snapshot = set.snapshot();
    assert_eq!(snapshot.queues, 4);
    assert_eq!(snapshot.packets_enqueued, 5);

    // New arrivals may now land on the added queues.
    waiting.extend((0..3).map(|i| queued(&set, i)));

    let mut finished = 0;
    let mut current = holder;
    while !waiting.is_empty() {
        current.finish();
        finished += 1;
        let mut dispatched = Vec::new();
        let mut still_waiting = Vec::new();
        for ticket in waiting {
            match ticket.try_outcome() {
                Ok(Decision::Execute(after)) => dispatched.push(after),
                Ok(other) => panic!("unexpected outcome {other:?}"),
                Err(ticket) => still_waiting.push(ticket),
            }
        }
        assert_eq!(dispatched.len(), 1, "exactly one request runs at a time");
        waiting = still_waiting;
        current = dispatched.pop().unwrap();
    }
    current.finish();
    finished += 1;

    let snapshot = set.snapshot();
    assert_eq!(finished, 9);
    assert_eq!(snapshot.dispatched, 9);
    assert_eq!(snapshot.timed_out, 0);
    assert_eq!(snapshot.rejected, 0);
    assert_eq!(snapshot.packets_enqueued, 0);
}

#[test]
fn surplus_queue_is_removed_once_drained() {
    let (_clock, set) = fake_set(config(2, 4, 10, Duration::from_secs(60)));
    // With a hand of one, hash 3 always deals queue 3.
    let in_last = running(queued(&set, 3));
    let in_first = running(queued(&set, 0));

    set.set_configuration(config(2, 1, 10, Duration::from_secs(60)));
    assert_eq!(set.snapshot().queues, 4);

    in_last.finish();
    let snapshot = set.snapshot();
    assert_eq!(snapshot.queues, 3);
    assert_eq!(snapshot.desired_queues, 1);

    // Queue 0 is within the desired count and survives draining.
    in_first.finish();
    assert_eq!(set.snapshot().queues, 3);
    running(queued(&set, 3)).finish();
    assert_eq!(set.snapshot().queues, 3);
}

#[test]
fn raising_the_limit_dispatches_waiting_packets() {
    let (_clock, set) = fake_set(config(1, 2, 10, Duration::from_secs(60)));
    let holder = running(queued(&set, 0));
    let waiting = queued(&set, 1);
    set.set_configuration(config(2, 2, 10, Duration::from_secs(60)));
    running(waiting).finish();
    holder.finish();
}

#[test]
fn quiesce_on_idle_set_fires_once() {
    let (_clock, set) = fake_set(config(1, 1, 1, Duration::from_secs(1)));
    let (tx, rx) = unbounded();
    set.quiesce(Some(Arc::new(move || {
        let _ = tx.send(());
    })));
    rx.recv_timeout(Duration::from_secs(5)).expect("handler fired");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(matches!(set.wait(0, 1), Outcome::Quiescent));
    assert!(set.snapshot().quiescent);
}

#[test]
fn quiesce_fires_after_last_request_finishes() {
    let (_clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(60)));
    let first = running(queued(&set, 0));
    let second = queued(&set, 0);
    let (tx, rx) = unbounded();
    set.quiesce(Some(Arc::new(move || {
        let _ = tx.send(());
    })));
    assert!(matches!(set.enqueue(0, 1), Admission::Quiescent));

    // Queued work still drains while quiescing.
    first.finish();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    running(second).finish();
    rx.recv_timeout(Duration::from_secs(5)).expect("handler fired");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn unquiesce_cancels_pending_handler() {
    let (_clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(60)));
    let holder = running(queued(&set, 0));
    let (tx, rx) = unbounded();
    set.quiesce(Some(Arc::new(move || {
        let _ = tx.send(());
    })));
    set.quiesce(None);
    holder.finish();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    running(queued(&set, 0)).finish();
}

#[test]
fn quiesce_fires_when_only_abandoned_requests_remain() {
    let (_clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(60)));
    let holder = running(queued(&set, 0));
    drop(queued(&set, 0));
    let (tx, rx) = unbounded();
    set.quiesce(Some(Arc::new(move || {
        let _ = tx.send(());
    })));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // Finishing discards the abandoned packet, which leaves the set idle.
    holder.finish();
    rx.recv_timeout(Duration::from_secs(5)).expect("handler fired");
    let snapshot = set.snapshot();
    assert_eq!(snapshot.packets_enqueued, 0);
    assert_eq!(snapshot.executing, 0);
    assert_eq!(snapshot.dispatched, 1);
}

#[test]
fn reconfiguring_a_quiescent_set_can_drain_it() {
    let (_clock, set) = fake_set(config(0, 1, 10, Duration::from_secs(60)));
    drop(queued(&set, 0));
    let (tx, rx) = unbounded();
    set.quiesce(Some(Arc::new(move || {
        let _ = tx.send(());
    })));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    set.set_configuration(config(1, 1, 10, Duration::from_secs(60)));
    rx.recv_timeout(Duration::from_secs(5)).expect("handler fired");
    assert_eq!(set.snapshot().packets_enqueued, 0);
}

#[test]
fn one_queue_serves_requests_in_arrival_order() {
    const WAITING: usize = 6;
    let (_clock, set) = fake_set(config(1, 1, 10, Duration::from_secs(60)));
    let mut current = running(queued(&set, 7));
    let mut waiting: Vec<(usize, Ticket)> = (0..WAITING).map(|i| (i, queued(&set, 7))).collect();

    let mut order = Vec::new();
    while !waiting.is_empty() {
        current.finish();
        let mut next = None;
        let mut still_waiting = Vec::new();
        for (arrival, ticket) in waiting {
            match ticket.try_outcome() {
                Ok(Decision::Execute(after)) => {
                    assert!(next.is_none(), "two requests dispatched by one finish");
                    order.push(arrival);
                    next = Some(after);
                }
                Ok(other) => panic!("unexpected outcome {other:?}"),
                Err(ticket) => still_waiting.push((arrival, ticket)),
            }
        }
        waiting = still_waiting;
        current = next.expect("a finish dispatches the next request");
    }
    current.finish();

    assert_eq!(order, (0..WAITING).collect::<Vec<_>>());
}
