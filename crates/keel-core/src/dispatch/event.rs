// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::EventFailurePolicy;
use crate::error::{ArchitectureError, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Marker for values that can travel through the [`EventBus`].
pub trait Event: Send + Sync + 'static {}

/// A shareable event handler.
///
/// Registering the same `EventHandler` twice keeps a single subscription;
/// handlers are told apart by the identity of the `Arc`.
pub type EventHandler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

type ErasedHandler = Arc<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;
type Deferred = Box<dyn FnOnce(&EventBus) -> Result<usize> + Send>;

struct Subscriber {
    id: u64,
    identity: usize,
    handler: ErasedHandler,
}

#[derive(Default)]
struct Subscribers {
    by_event: RwLock<HashMap<TypeId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    fn remove_where(&self, event: TypeId, matches: impl Fn(&Subscriber) -> bool) -> bool {
        let mut by_event = self
            .by_event
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = by_event.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|subscriber| !matches(subscriber));
        let removed = list.len() < before;
        if list.is_empty() {
            by_event.remove(&event);
        }
        removed
    }
}

/// Synchronous, type-keyed publish/subscribe.
///
/// Handlers for an event type run on the sending thread in registration
/// order. The subscriber table is only locked while it is read or changed,
/// never while handlers run, so handlers may subscribe and unsubscribe
/// freely; a send that is already in flight delivers to the handlers that
/// were registered when it started.
///
/// Events can also be posted to a deferred queue (an unbounded `flume`
/// channel) and delivered later by [`flush`](EventBus::flush).
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    policy: EventFailurePolicy,
    sender: flume::Sender<Deferred>,
    receiver: flume::Receiver<Deferred>,
}

impl EventBus {
    /// Creates an empty bus with the given failure policy.
    pub fn new(policy: EventFailurePolicy) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            subscribers: Arc::new(Subscribers::default()),
            policy,
            sender,
            receiver,
        }
    }

    /// The failure policy applied by [`send`](Self::send).
    pub fn policy(&self) -> EventFailurePolicy {
        self.policy
    }

    /// Subscribes a closure to events of type `E`.
    ///
    /// Every call creates a new subscription, even for identical closures.
    pub fn register<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: EventHandler<E> = Arc::new(handler);
        self.register_handler(handler)
    }

    /// Subscribes a shared handler to events of type `E`.
    ///
    /// If this exact handler is already subscribed, the existing
    /// subscription is returned and the handler still runs once per event.
    pub fn register_handler<E: Event>(&self, handler: EventHandler<E>) -> Subscription {
        let identity = Arc::as_ptr(&handler) as *const () as usize;
        let event = TypeId::of::<E>();

        let mut by_event = self
            .subscribers
            .by_event
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = by_event.entry(event).or_default();

        if let Some(existing) = list.iter().find(|s| s.identity == identity) {
            log::debug!(
                "EventBus: handler already subscribed to {}; keeping subscription #{}",
                type_name::<E>(),
                existing.id
            );
            return self.subscription::<E>(existing.id);
        }

        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: ErasedHandler = Arc::new(move |event: &dyn Any| match event.downcast_ref::<E>() {
            Some(event) => handler(event),
            None => Ok(()),
        });
        list.push(Subscriber {
            id,
            identity,
            handler: erased,
        });
        log::trace!("EventBus: subscription #{id} added for {}", type_name::<E>());
        self.subscription::<E>(id)
    }

    /// Removes a shared handler previously passed to
    /// [`register_handler`](Self::register_handler).
    ///
    /// Returns `false` if it was not subscribed.
    pub fn unregister_handler<E: Event>(&self, handler: &EventHandler<E>) -> bool {
        let identity = Arc::as_ptr(handler) as *const () as usize;
        self.subscribers
            .remove_where(TypeId::of::<E>(), |s| s.identity == identity)
    }

    /// Delivers `event` to every handler of `E`, in registration order.
    ///
    /// Returns how many handlers completed successfully.
    ///
    /// # Errors
    ///
    /// Under [`EventFailurePolicy::Abort`] the first failing handler stops
    /// delivery and its error is returned as
    /// [`ArchitectureError::HandlerExecutionFailed`]. Under
    /// [`EventFailurePolicy::Isolate`] failures are logged and delivery
    /// continues.
    pub fn send<E: Event>(&self, event: &E) -> Result<usize> {
        let handlers: Vec<ErasedHandler> = self
            .subscribers
            .by_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map(|list| list.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        log::trace!(
            "EventBus: sending {} to {} handler(s)",
            type_name::<E>(),
            handlers.len()
        );

        let mut delivered = 0;
        for handler in handlers {
            match handler(event as &dyn Any) {
                Ok(()) => delivered += 1,
                Err(source) => match self.policy {
                    EventFailurePolicy::Abort => {
                        return Err(ArchitectureError::HandlerExecutionFailed {
                            handler: type_name::<E>(),
                            source,
                        });
                    }
                    EventFailurePolicy::Isolate => {
                        log::error!(
                            "EventBus: handler for {} failed: {source:#}",
                            type_name::<E>()
                        );
                    }
                },
            }
        }
        Ok(delivered)
    }

    /// Queues `event` for delivery by the next [`flush`](Self::flush).
    pub fn post<E: Event>(&self, event: E) {
        let deferred: Deferred = Box::new(move |bus: &EventBus| bus.send(&event));
        if let Err(e) = self.sender.send(deferred) {
            log::error!("EventBus: failed to queue {}: {e}", type_name::<E>());
        }
    }

    /// Delivers the events that were queued when the flush started, oldest
    /// first. Events posted by handlers during the flush wait for the next one.
    ///
    /// # Errors
    ///
    /// Stops at the first delivery that fails under
    /// [`EventFailurePolicy::Abort`]; events behind it stay queued.
    pub fn flush(&self) -> Result<usize> {
        let pending = self.receiver.len();
        let mut delivered = 0;
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(deferred) => delivered += deferred(self)?,
                Err(_) => break,
            }
        }
        Ok(delivered)
    }

    /// Number of events waiting in the deferred queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Number of handlers subscribed to `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.subscribers
            .by_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drops every subscription and every queued event.
    pub fn clear(&self) {
        self.subscribers
            .by_event
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let dropped = self.receiver.drain().count();
        if dropped > 0 {
            log::debug!("EventBus: discarded {dropped} undelivered event(s)");
        }
    }

    fn subscription<E: Event>(&self, id: u64) -> Subscription {
        Subscription {
            event: TypeId::of::<E>(),
            event_name: type_name::<E>(),
            id,
            bus: Arc::downgrade(&self.subscribers),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventFailurePolicy::default())
    }
}

/// Handle returned by every registration; used to unsubscribe.
#[must_use = "dropping a Subscription keeps the handler registered; call `unregister` or `unregister_on_drop`"]
#[derive(Clone)]
pub struct Subscription {
    event: TypeId,
    event_name: &'static str,
    id: u64,
    bus: Weak<Subscribers>,
}

impl Subscription {
    /// Removes the handler. Returns `true` only for the call that removed it.
    pub fn unregister(&self) -> bool {
        let removed = self
            .bus
            .upgrade()
            .is_some_and(|bus| bus.remove_where(self.event, |s| s.id == self.id));
        if removed {
            log::trace!("EventBus: subscription #{} removed from {}", self.id, self.event_name);
        }
        removed
    }

    /// Turns the subscription into a guard that unregisters when dropped.
    pub fn unregister_on_drop(self) -> SubscriptionGuard {
        SubscriptionGuard { subscription: self }
    }

    /// Identifier of the subscription, unique per bus.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Type name of the subscribed event.
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event_name)
            .field("id", &self.id)
            .finish()
    }
}

/// Unregisters its subscription when dropped.
#[must_use = "the handler is unregistered as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SubscriptionGuard {
    subscription: Subscription,
}

impl SubscriptionGuard {
    /// The guarded subscription.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscription.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct ScoreChanged(u32);
    impl Event for ScoreChanged {}

    #[derive(Debug, Clone)]
    struct LevelCleared;
    impl Event for LevelCleared {}

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&ScoreChanged) -> anyhow::Result<()> + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &ScoreChanged| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let _sub = bus.register(move |e: &ScoreChanged| {
                seen.lock().unwrap().push((label, e.0));
                Ok(())
            });
        }

        assert_eq!(bus.send(&ScoreChanged(5)).unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 5), ("b", 5), ("c", 5)]);
    }

    #[test]
    fn test_events_are_routed_by_type() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let _sub = bus.register::<ScoreChanged, _>(handler);

        assert_eq!(bus.send(&LevelCleared).unwrap(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.send(&ScoreChanged(1)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_removes_only_that_handler() {
        let bus = EventBus::default();
        let (first_count, first) = counter();
        let (second_count, second) = counter();
        let first_sub = bus.register::<ScoreChanged, _>(first);
        let _second_sub = bus.register::<ScoreChanged, _>(second);

        assert!(first_sub.unregister());
        bus.send(&ScoreChanged(1)).unwrap();

        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count::<ScoreChanged>(), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let bus = EventBus::default();
        let (_, handler) = counter();
        let sub = bus.register::<ScoreChanged, _>(handler);

        assert!(sub.unregister());
        assert!(!sub.unregister());
        assert!(!sub.clone().unregister());
        assert_eq!(bus.handler_count::<ScoreChanged>(), 0);
    }

    #[test]
    fn test_same_handler_registered_twice_fires_once() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let handler: EventHandler<ScoreChanged> = Arc::new(handler);

        let first = bus.register_handler(Arc::clone(&handler));
        let second = bus.register_handler(Arc::clone(&handler));
        assert_eq!(first.id(), second.id());

        bus.send(&ScoreChanged(3)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(bus.unregister_handler(&handler));
        bus.send(&ScoreChanged(4)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abort_policy_stops_delivery() {
        let bus = EventBus::new(EventFailurePolicy::Abort);
        let (count, handler) = counter();
        let _failing = bus.register(|_: &ScoreChanged| Err(anyhow::anyhow!("boom")));
        let _counting = bus.register::<ScoreChanged, _>(handler);

        let err = bus.send(&ScoreChanged(1)).unwrap_err();
        assert!(matches!(err, ArchitectureError::HandlerExecutionFailed { handler, .. } if handler.contains("ScoreChanged")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_isolate_policy_keeps_delivering() {
        let bus = EventBus::new(EventFailurePolicy::Isolate);
        let (count, handler) = counter();
        let _failing = bus.register(|_: &ScoreChanged| Err(anyhow::anyhow!("boom")));
        let _counting = bus.register::<ScoreChanged, _>(handler);

        assert_eq!(bus.send(&ScoreChanged(1)).unwrap(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself_during_send() {
        let bus = Arc::new(EventBus::default());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let fired = Arc::new(AtomicUsize::new(0));

        let (slot_in, fired_in) = (Arc::clone(&slot), Arc::clone(&fired));
        let sub = bus.register(move |_: &ScoreChanged| {
            fired_in.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot_in.lock().unwrap().as_ref() {
                sub.unregister();
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(sub);

        bus.send(&ScoreChanged(1)).unwrap();
        bus.send(&ScoreChanged(2)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_posted_events_wait_for_flush() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let _sub = bus.register(move |e: &ScoreChanged| {
            inner.lock().unwrap().push(e.0);
            Ok(())
        });

        bus.post(ScoreChanged(1));
        bus.post(ScoreChanged(2));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.pending(), 2);

        assert_eq!(bus.flush().unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        {
            let _guard = bus.register::<ScoreChanged, _>(handler).unregister_on_drop();
            bus.send(&ScoreChanged(1)).unwrap();
        }
        bus.send(&ScoreChanged(2)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_drops_subscriptions_and_queue() {
        let bus = EventBus::default();
        let (count, handler) = counter();
        let sub = bus.register::<ScoreChanged, _>(handler);
        bus.post(ScoreChanged(9));

        bus.clear();
        assert_eq!(bus.pending(), 0);
        assert_eq!(bus.flush().unwrap(), 0);
        assert!(!sub.unregister());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
