//! # In-process event bus with a single dispatcher.
//!
//! [`EventBus`] broadcasts every pushed [`Event`] to every current
//! [`Subscriber`]. All work goes through one intake queue drained by one
//! dispatch task, which exclusively owns the subscriber set.
//!
//! ## Architecture
//! ```text
//! Producers (many):                     Subscribers:
//!   push(ev)        ──┐                  ┌──► [queue 1] ──► plugin A
//!   subscribe()     ──┼─► [intake] ─► dispatch ──► [queue 2] ──► plugin B
//!   unsubscribe(s)  ──┘   (bounded)      └──► [queue N] ──► plugin N
//! ```
//!
//! ## Rules
//! - **Per-subscriber FIFO**: each subscriber sees events in push order.
//! - **No replay**: a subscriber only sees events pushed after its subscription.
//! - **Blocking backpressure**: the dispatcher awaits room in every queue. One
//!   stalled subscriber stalls delivery to all others and, once the intake is
//!   full, every producer calling [`EventBus::push`].
//! - **Stop closes queues**: readers observe end-of-stream after draining.
//!
//! ## Capacities
//! Intake and every subscriber queue hold [`QUEUE_CAPACITY`] (128) items.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::event::Event;
use super::filter::EventFilter;
use crate::logging::Logger;

/// Capacity of the intake queue and of every subscriber queue.
pub const QUEUE_CAPACITY: usize = 128;

enum Command {
    Publish(Event),
    Subscribe(u64, mpsc::Sender<Event>),
    Unsubscribe(u64),
}

/// Publish/subscribe broker shared by all plugins.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    tx: mpsc::Sender<Command>,
    next_id: AtomicU64,
    state: Mutex<State>,
    log: Logger,
}

struct State {
    /// Intake receiver while the dispatcher is not running.
    intake: Option<mpsc::Receiver<Command>>,
    running: Option<Dispatcher>,
}

struct Dispatcher {
    shutdown: CancellationToken,
    join: JoinHandle<mpsc::Receiver<Command>>,
}

impl EventBus {
    /// Creates a stopped bus.
    pub fn new(log: Logger) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tx,
                next_id: AtomicU64::new(1),
                state: Mutex::new(State {
                    intake: Some(rx),
                    running: None,
                }),
                log,
            }),
        }
    }

    /// Starts the dispatch task. No-op if already running.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        if state.running.is_some() {
            return;
        }
        let Some(intake) = state.intake.take() else {
            tracing::error!(parent: self.inner.log.span(), "event bus intake lost, cannot start");
            return;
        };

        let shutdown = CancellationToken::new();
        let join = tokio::spawn(dispatch(intake, shutdown.clone(), self.inner.log.clone()));
        state.running = Some(Dispatcher { shutdown, join });
        tracing::debug!(parent: self.inner.log.span(), "event bus started");
    }

    /// Stops the dispatch task and closes every subscriber queue.
    ///
    /// Completes even while the dispatcher is blocked on a saturated
    /// subscriber. Work still waiting in the intake is discarded. No-op if
    /// not running; the bus may be started again afterwards with an empty
    /// subscriber set.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(dispatcher) = state.running.take() else {
            return;
        };

        dispatcher.shutdown.cancel();
        match dispatcher.join.await {
            Ok(mut intake) => {
                while intake.try_recv().is_ok() {}
                state.intake = Some(intake);
                tracing::debug!(parent: self.inner.log.span(), "event bus stopped");
            }
            Err(e) => {
                tracing::error!(parent: self.inner.log.span(), error = %e, "event bus dispatcher failed");
            }
        }
    }

    /// Returns `true` while the dispatch task is running.
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running.is_some()
    }

    /// Enqueues an event for broadcast.
    ///
    /// Returns once the event is in the intake; delivery happens later.
    /// Waits while the intake is full.
    pub async fn push(&self, ev: Event) {
        if self.inner.tx.send(Command::Publish(ev)).await.is_err() {
            tracing::warn!(parent: self.inner.log.span(), "event bus is gone, event dropped");
        }
    }

    /// Registers a new subscriber.
    ///
    /// The subscriber receives every event pushed after this call returns.
    pub async fn subscribe(&self) -> Subscriber {
        let id = self.inner.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        // A failed send drops `tx`, so the subscriber just sees end-of-stream.
        let _ = self.inner.tx.send(Command::Subscribe(id, tx)).await;
        Subscriber { id, rx }
    }

    /// Removes a subscriber; its queue is closed once already-queued events are read.
    pub async fn unsubscribe(&self, sub: &Subscriber) {
        let _ = self.inner.tx.send(Command::Unsubscribe(sub.id)).await;
    }
}

async fn dispatch(
    mut intake: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    log: Logger,
) -> mpsc::Receiver<Command> {
    let mut subscribers: BTreeMap<u64, mpsc::Sender<Event>> = BTreeMap::new();

    'dispatch: loop {
        let cmd = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break 'dispatch,
            cmd = intake.recv() => cmd,
        };
        let Some(cmd) = cmd else { break 'dispatch };

        match cmd {
            Command::Publish(ev) => {
                let mut gone = Vec::new();
                for (id, tx) in &subscribers {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break 'dispatch,
                        res = tx.send(ev.clone()) => {
                            if res.is_err() {
                                gone.push(*id);
                            }
                        }
                    }
                }
                for id in gone {
                    subscribers.remove(&id);
                    tracing::debug!(parent: log.span(), subscriber = id, "subscriber dropped its queue");
                }
            }
            Command::Subscribe(id, tx) => {
                subscribers.insert(id, tx);
            }
            Command::Unsubscribe(id) => {
                subscribers.remove(&id);
            }
        }
    }

    // Dropping the senders closes every subscriber queue.
    drop(subscribers);
    intake
}

/// Receiving end of one subscription.
///
/// Owned by exactly one reader. Dropping it is equivalent to unsubscribing:
/// the bus forgets it on the next broadcast.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl Subscriber {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event; `None` once the queue is closed and drained.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Waits for the next event matching `filter`, discarding others.
    pub async fn next_matching(&mut self, filter: &EventFilter) -> Option<Event> {
        while let Some(ev) = self.rx.recv().await {
            if filter.matches(&ev) {
                return Some(ev);
            }
        }
        None
    }

    /// Returns an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::events::EventKind;

    async fn started_bus() -> EventBus {
        let bus = EventBus::new(Logger::detached());
        bus.start().await;
        bus
    }

    #[tokio::test]
    async fn every_subscriber_sees_events_in_push_order() {
        let bus = started_bus().await;
        let mut subs = Vec::new();
        for _ in 0..4 {
            subs.push(bus.subscribe().await);
        }

        let ids: Vec<String> = (0..50).map(|i| format!("svc-{i}")).collect();
        for id in &ids {
            bus.push(Event::service_started(id.as_str())).await;
        }

        for sub in &mut subs {
            for id in &ids {
                let ev = sub.next().await.unwrap();
                assert_eq!(ev.subject_id(), id);
            }
        }
        bus.stop().await;
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let bus = started_bus().await;
        let mut early = bus.subscribe().await;

        bus.push(Event::service_started("a")).await;
        let mut late = bus.subscribe().await;
        bus.push(Event::service_started("b")).await;

        assert_eq!(early.next().await.unwrap().subject_id(), "a");
        assert_eq!(early.next().await.unwrap().subject_id(), "b");
        assert_eq!(late.next().await.unwrap().subject_id(), "b");
        assert!(late.try_next().is_none());
        bus.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_subscriber_stalls_everyone() {
        let bus = started_bus().await;
        let mut frozen = bus.subscribe().await;
        let mut draining = bus.subscribe().await;

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(ev) = draining.next().await {
                if seen_tx.send(ev.seq()).is_err() {
                    break;
                }
            }
        });

        let total = 3 * QUEUE_CAPACITY;
        let producer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for _ in 0..total {
                    bus.push(Event::request_metrics()).await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut seen = 0;
        while seen_rx.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, QUEUE_CAPACITY, "draining subscriber stops at the frozen one's capacity");
        assert!(!producer.is_finished(), "producer must be stalled");
        assert!(
            timeout(Duration::from_millis(50), bus.push(Event::request_shutdown()))
                .await
                .is_err(),
            "other producers must be stalled too"
        );

        for _ in 0..total {
            assert!(frozen.next().await.is_some());
        }
        producer.await.unwrap();
        for _ in 0..(total - QUEUE_CAPACITY) {
            seen_rx.recv().await.unwrap();
        }

        bus.stop().await;
        reader.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_completes_while_dispatcher_is_blocked() {
        let bus = started_bus().await;
        let mut frozen = bus.subscribe().await;

        for _ in 0..(QUEUE_CAPACITY + 5) {
            bus.push(Event::request_metrics()).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        timeout(Duration::from_secs(1), bus.stop()).await.unwrap();

        let mut received = 0;
        while frozen.next().await.is_some() {
            received += 1;
        }
        assert_eq!(received, QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn stop_closes_queues_and_is_idempotent() {
        let bus = started_bus().await;
        bus.start().await;
        let mut sub = bus.subscribe().await;
        bus.push(Event::request_metrics()).await;
        assert!(sub.next().await.unwrap().is(EventKind::RequestMetrics));

        bus.stop().await;
        bus.stop().await;
        assert!(!bus.is_running().await);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn restart_begins_with_empty_subscriber_set() {
        let bus = started_bus().await;
        let mut old = bus.subscribe().await;
        bus.stop().await;
        assert!(old.next().await.is_none());

        bus.start().await;
        let mut fresh = bus.subscribe().await;
        bus.push(Event::service_exited("x")).await;
        assert_eq!(fresh.next().await.unwrap().subject_id(), "x");
        bus.stop().await;
    }

    #[tokio::test]
    async fn unsubscribe_closes_only_that_queue() {
        let bus = started_bus().await;
        let mut a = bus.subscribe().await;
        let mut b = bus.subscribe().await;

        bus.unsubscribe(&a).await;
        bus.push(Event::service_started("z")).await;

        assert!(a.next().await.is_none());
        assert_eq!(b.next().await.unwrap().subject_id(), "z");
        bus.stop().await;
    }

    #[tokio::test]
    async fn next_matching_skips_other_events() {
        let bus = started_bus().await;
        let mut sub = bus.subscribe().await;

        bus.push(Event::service_started("a")).await;
        bus.push(Event::request_metrics()).await;
        bus.push(Event::service_exited("a")).await;

        let ev = sub
            .next_matching(&EventFilter::Kind(EventKind::ServiceExited))
            .await
            .unwrap();
        assert_eq!(ev.subject_id(), "a");
        bus.stop().await;
    }
}
