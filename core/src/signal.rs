//! Cold event producers, observers and disposables.
//!
//! # Design
//! A `SignalProducer` is a recipe, not a running operation: constructing one
//! does nothing, and every `start` runs the recipe again for a fresh
//! `Observer`/`Disposable` pair. An observer delivers at most one terminal
//! event (`Failed`, `Completed`, `Interrupted`) and drops everything after
//! it. A terminal event disposes the subscription, so cleanup registered on
//! the `Disposable` runs exactly once whether the stream finished by itself
//! or the caller disposed it.
//!
//! `EventStream` adapts a subscription to `futures::Stream`; dropping the
//! stream disposes the subscription.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Stream, StreamExt};

/// One event of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T, E> {
    Value(T),
    Failed(E),
    Completed,
    /// The work was stopped before it could finish. Not a failure.
    Interrupted,
}

impl<T, E> Event<T, E> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Value(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Event::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Event::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Lock a mutex, recovering the data if another thread panicked with it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Action = Box<dyn FnOnce() + Send>;

/// Cleanup for one subscription.
///
/// Each added action runs exactly once: on the first `dispose`, or right
/// away if the disposable was already disposed when it was added.
#[derive(Clone, Default)]
pub struct Disposable {
    inner: Arc<DisposableInner>,
}

#[derive(Default)]
struct DisposableInner {
    disposed: AtomicBool,
    actions: Mutex<Vec<Action>>,
}

impl Disposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn add(&self, action: impl FnOnce() + Send + 'static) {
        {
            let mut actions = lock(&self.inner.actions);
            // Checked under the lock: `dispose` flips the flag before it
            // drains, so nothing pushed here can be missed.
            if !self.is_disposed() {
                actions.push(Box::new(action));
                return;
            }
        }
        action();
    }

    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let actions = std::mem::take(&mut *lock(&self.inner.actions));
        for action in actions {
            action();
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

type Sink<T, E> = Box<dyn FnMut(Event<T, E>) + Send>;

/// The sending side of a subscription.
pub struct Observer<T, E> {
    inner: Arc<ObserverInner<T, E>>,
}

struct ObserverInner<T, E> {
    sink: Mutex<Sink<T, E>>,
    terminated: AtomicBool,
    disposable: Disposable,
}

impl<T, E> Clone for Observer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Observer<T, E> {
    fn new(sink: Sink<T, E>, disposable: Disposable) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                sink: Mutex::new(sink),
                terminated: AtomicBool::new(false),
                disposable,
            }),
        }
    }

    /// Deliver `event` unless the subscription already terminated or was
    /// disposed. A terminal event disposes the subscription after delivery.
    pub fn send(&self, event: Event<T, E>) {
        let terminal = event.is_terminal();
        {
            let mut guard = lock(&self.inner.sink);
            if self.is_terminated() {
                return;
            }
            if terminal {
                self.inner.terminated.store(true, Ordering::Release);
            }
            let sink = &mut *guard;
            sink(event);
        }
        if terminal {
            self.inner.disposable.dispose();
        }
    }

    pub fn send_value(&self, value: T) {
        self.send(Event::Value(value));
    }

    pub fn send_failed(&self, error: E) {
        self.send(Event::Failed(error));
    }

    pub fn send_completed(&self) {
        self.send(Event::Completed);
    }

    pub fn send_interrupted(&self) {
        self.send(Event::Interrupted);
    }

    /// True once a terminal event went out or the subscription was disposed.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire) || self.inner.disposable.is_disposed()
    }
}

type Body<T, E> = dyn Fn(Observer<T, E>, &Disposable) + Send + Sync;

/// A cold producer of events.
pub struct SignalProducer<T, E> {
    body: Arc<Body<T, E>>,
}

impl<T, E> Clone for SignalProducer<T, E> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
        }
    }
}

impl<T, E> SignalProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wrap `body`, which runs once per `start`.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(Observer<T, E>, &Disposable) + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    /// Run the producer, delivering its events to `sink`.
    pub fn start<S>(&self, sink: S) -> Disposable
    where
        S: FnMut(Event<T, E>) + Send + 'static,
    {
        let disposable = Disposable::new();
        let observer = Observer::new(Box::new(sink), disposable.clone());
        self.start_with(observer, &disposable);
        disposable
    }

    pub(crate) fn start_with(&self, observer: Observer<T, E>, disposable: &Disposable) {
        (self.body)(observer, disposable);
    }

    /// Run the producer and consume its events as a `Stream`.
    pub fn events(&self) -> EventStream<T, E> {
        let (tx, rx) = mpsc::unbounded();
        let closer = tx.clone();
        let disposable = self.start(move |event| {
            let _ = tx.unbounded_send(event);
        });
        disposable.add(move || closer.close_channel());
        EventStream { rx, disposable }
    }
}

/// A running subscription seen as a `futures::Stream`.
///
/// Ends after the terminal event or after disposal. Dropping it disposes
/// the subscription.
pub struct EventStream<T, E> {
    rx: mpsc::UnboundedReceiver<Event<T, E>>,
    disposable: Disposable,
}

impl<T, E> EventStream<T, E> {
    pub fn dispose(&self) {
        self.disposable.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposable.is_disposed()
    }
}

impl<T, E> Stream for EventStream<T, E> {
    type Item = Event<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl<T, E> Drop for EventStream<T, E> {
    fn drop(&mut self) {
        self.disposable.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::AtomicUsize;

    type Slot = Arc<Mutex<Option<Observer<i32, String>>>>;

    /// A producer that parks its observer so the test can drive it.
    fn parked(slot: Slot) -> SignalProducer<i32, String> {
        SignalProducer::new(move |observer, _| {
            *lock(&slot) = Some(observer);
        })
    }

    fn recorder() -> (
        Arc<Mutex<Vec<Event<i32, String>>>>,
        impl FnMut(Event<i32, String>) + Send + 'static,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        (events, move |event| sink_events.lock().unwrap().push(event))
    }

    #[test]
    fn producer_is_cold() {
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&starts);
        let producer: SignalProducer<i32, String> = SignalProducer::new(move |observer, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            observer.send_completed();
        });
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        producer.start(|_| {});
        producer.start(|_| {});
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn only_first_terminal_event_is_delivered() {
        let slot = Slot::default();
        let (events, sink) = recorder();
        parked(Arc::clone(&slot)).start(sink);

        let observer = slot.lock().unwrap().take().unwrap();
        observer.send_value(1);
        observer.send_completed();
        observer.send_value(2);
        observer.send_failed("late".to_string());
        observer.send_interrupted();

        assert_eq!(*events.lock().unwrap(), vec![Event::Value(1), Event::Completed]);
        assert!(observer.is_terminated());
    }

    #[test]
    fn terminal_event_disposes_subscription() {
        let producer: SignalProducer<i32, String> =
            SignalProducer::new(|observer, _| observer.send_failed("boom".to_string()));
        let disposable = producer.start(|_| {});
        assert!(disposable.is_disposed());
    }

    #[test]
    fn disposed_subscription_drops_events() {
        let slot = Slot::default();
        let (events, sink) = recorder();
        let disposable = parked(Arc::clone(&slot)).start(sink);

        disposable.dispose();
        let observer = slot.lock().unwrap().take().unwrap();
        observer.send_value(1);
        observer.send_completed();

        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn disposable_actions_run_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposable = Disposable::new();
        let counter = Arc::clone(&runs);
        disposable.add(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        disposable.dispose();
        disposable.dispose();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&runs);
        disposable.add(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2, "late action runs immediately");
    }

    #[test]
    fn event_stream_ends_after_terminal_event() {
        let producer: SignalProducer<i32, String> = SignalProducer::new(|observer, _| {
            observer.send_value(7);
            observer.send_completed();
        });
        let events: Vec<_> = block_on(producer.events().collect());
        assert_eq!(events, vec![Event::Value(7), Event::Completed]);
    }

    #[test]
    fn dropping_event_stream_disposes() {
        let slot = Slot::default();
        let stream = parked(Arc::clone(&slot)).events();
        let observer = slot.lock().unwrap().take().unwrap();
        assert!(!observer.is_terminated());

        drop(stream);
        assert!(observer.is_terminated());
    }

    #[test]
    fn disposing_event_stream_ends_it() {
        let slot = Slot::default();
        let mut stream = parked(Arc::clone(&slot)).events();
        stream.dispose();
        assert!(stream.is_disposed());
        assert_eq!(block_on(stream.next()), None);
    }

    #[test]
    fn event_helpers() {
        let value: Event<i32, String> = Event::Value(3);
        assert!(!value.is_terminal());
        assert_eq!(value.into_value(), Some(3));

        let failed: Event<i32, String> = Event::Failed("x".to_string());
        assert!(failed.is_terminal());
        assert_eq!(failed.error().map(String::as_str), Some("x"));
        assert!(Event::<i32, String>::Interrupted.is_terminal());
    }
}
