//! Event base: immutable header, typed payload, and the type-erased
//! envelope that crosses the dispatcher and subscriber queues.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::priority::Priority;

/// Any payload type usable with this crate's events: `Send + Sync +
/// 'static` so it can cross thread boundaries and be type-erased.
pub trait EventPayload: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> EventPayload for T {}

/// A stable, cheap type tag for a concrete event payload type, used to key
/// handler tables and type filters instead of relying on language
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(TypeId);

impl TypeKey {
    pub fn of<T: EventPayload>() -> Self {
        TypeKey(TypeId::of::<T>())
    }
}

fn now_wall_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An immutable message: a payload of type `T`, a creation timestamp, and a
/// dispatch [`Priority`].
///
/// The payload is stored behind an `Arc` internally so `Event<T>` is always
/// `Clone` regardless of whether `T` implements `Clone` — this is what lets
/// the dispatcher fan one published event out to many subscribers without
/// requiring user payload types to be `Clone`.
pub struct Event<T> {
    data: Arc<T>,
    priority: Priority,
    created: Instant,
    created_wall_millis: u64,
}

impl<T> Event<T> {
    /// Creates an event with the default ([`Priority::Medium`]) priority.
    pub fn new(data: T) -> Self {
        Self::with_priority(data, Priority::default())
    }

    /// Creates an event with an explicit priority.
    pub fn with_priority(data: T, priority: Priority) -> Self {
        Self {
            data: Arc::new(data),
            priority,
            created: Instant::now(),
            created_wall_millis: now_wall_millis(),
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Monotonic creation instant, suitable for measuring elapsed time.
    pub fn created_time(&self) -> Instant {
        self.created
    }

    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub fn created_time_millis(&self) -> u64 {
        self.created_wall_millis
    }

    /// Milliseconds elapsed since this event was created.
    pub fn existing_time_millis(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    /// Orders two events by priority, higher first — the comparator the
    /// dispatch queues are built on. A bare `Event<T>` carries no arrival
    /// sequence (that's assigned once it's enqueued, see [`ErasedEvent`]),
    /// so the FIFO tie-break for equal priorities is realized there, in
    /// [`crate::queue::PriorityQueue`]'s `Ord` for queued entries, rather
    /// than here.
    pub fn priority_comparator(a: &Self, b: &Self) -> Ordering {
        a.priority.cmp(&b.priority)
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            priority: self.priority,
            created: self.created,
            created_wall_millis: self.created_wall_millis,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("data", &self.data)
            .field("priority", &self.priority)
            .field("created_wall_millis", &self.created_wall_millis)
            .finish()
    }
}

/// An event whose payload is an ordered sequence of [`Event<T>`] of a fixed
/// concrete type `T`, delivered as a single unit to a list handler.
pub struct ListEvent<T> {
    events: Arc<Vec<Event<T>>>,
    priority: Priority,
    created: Instant,
    created_wall_millis: u64,
}

impl<T> ListEvent<T> {
    /// Builds a `ListEvent` from a batch of events. Its priority is the
    /// maximum priority among its members (falling back to
    /// [`Priority::default`] if empty), matching the "higher priority
    /// dispatched first" rule applied uniformly to single and list events.
    pub fn new(events: Vec<Event<T>>) -> Self {
        let priority = events
            .iter()
            .map(Event::priority)
            .max()
            .unwrap_or_default();
        Self {
            events: Arc::new(events),
            priority,
            created: Instant::now(),
            created_wall_millis: now_wall_millis(),
        }
    }

    pub fn events(&self) -> &[Event<T>] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_time(&self) -> Instant {
        self.created
    }

    pub fn created_time_millis(&self) -> u64 {
        self.created_wall_millis
    }

    /// Same comparator as [`Event::priority_comparator`], applied to the
    /// list's own (max-of-members) priority.
    pub fn priority_comparator(a: &Self, b: &Self) -> Ordering {
        a.priority.cmp(&b.priority)
    }
}

impl<T> Clone for ListEvent<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            priority: self.priority,
            created: self.created,
            created_wall_millis: self.created_wall_millis,
        }
    }
}

/// The type-erased envelope that crosses the dispatcher's global queue and
/// each subscriber's local priority queue. `payload` holds either an
/// `Event<T>` or a `ListEvent<T>`, downcast back to its concrete type by
/// the handler tables keyed on `type_key`.
#[derive(Clone)]
pub struct ErasedEvent {
    pub(crate) type_key: TypeKey,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    payload: Arc<dyn Any + Send + Sync>,
}

impl ErasedEvent {
    pub(crate) fn from_event<T: EventPayload>(event: Event<T>, seq: u64) -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            priority: event.priority(),
            seq,
            payload: Arc::new(event),
        }
    }

    pub(crate) fn from_list_event<T: EventPayload>(event: ListEvent<T>, seq: u64) -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            priority: event.priority(),
            seq,
            payload: Arc::new(event),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Attempts to recover the concrete `Event<T>` this envelope carries.
    /// Returns `None` if `T` does not match the payload's original type, or
    /// if this envelope carries a `ListEvent<T>` rather than an `Event<T>`.
    pub fn downcast_event<T: EventPayload>(&self) -> Option<Event<T>> {
        self.payload.downcast_ref::<Event<T>>().cloned()
    }

    /// Attempts to recover the concrete `ListEvent<T>` this envelope
    /// carries.
    pub fn downcast_list_event<T: EventPayload>(&self) -> Option<ListEvent<T>> {
        self.payload.downcast_ref::<ListEvent<T>>().cloned()
    }
}

impl std::fmt::Debug for ErasedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedEvent")
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_accessors() {
        let e = Event::with_priority("hi".to_string(), Priority::High);
        assert_eq!(e.data(), "hi");
        assert_eq!(e.priority(), Priority::High);
        assert!(e.existing_time_millis() < 1000);
    }

    #[test]
    fn event_clone_does_not_require_clone_payload() {
        struct NotClone(i32);
        let e = Event::new(NotClone(5));
        let e2 = e.clone();
        assert_eq!(e2.data().0, 5);
    }

    #[test]
    fn erased_event_roundtrip() {
        let e = Event::with_priority(42i32, Priority::Critical);
        let erased = ErasedEvent::from_event(e, 1);
        assert_eq!(erased.type_key(), TypeKey::of::<i32>());
        let back = erased.downcast_event::<i32>().unwrap();
        assert_eq!(*back.data(), 42);
        assert!(erased.downcast_event::<String>().is_none());
    }

    #[test]
    fn list_event_priority_is_max_of_members() {
        let list = ListEvent::new(vec![
            Event::with_priority(1, Priority::Low),
            Event::with_priority(2, Priority::High),
        ]);
        assert_eq!(list.priority(), Priority::High);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn priority_comparator_orders_higher_first() {
        let low = Event::with_priority(1, Priority::Low);
        let high = Event::with_priority(2, Priority::High);
        assert_eq!(Event::priority_comparator(&high, &low), std::cmp::Ordering::Greater);
        assert_eq!(Event::priority_comparator(&low, &low), std::cmp::Ordering::Equal);
    }
}
