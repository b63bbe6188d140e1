//! Subscriber family: each variant owns a local priority queue fed by the
//! dispatcher and processes it through type-keyed handlers.

mod async_single;
mod batch_list;
mod buffered;
mod single;
mod sync_single;

pub use async_single::AsyncSingleSubscriber;
pub use batch_list::BatchListSubscriber;
pub use buffered::BufferedSubscriber;
pub use sync_single::SyncSingleSubscriber;

use std::sync::Arc;

use crate::dispatcher::{Dispatcher, EventSink, SubscriberId};
use crate::error::EventBusError;
use crate::queue::PriorityQueue;
use crate::status::LifecycleState;

/// State shared by every subscriber variant: identity, lifecycle, and the
/// local priority queue the dispatcher delivers into.
pub(crate) struct SubscriberCore {
    pub(crate) id: SubscriberId,
    pub(crate) status: LifecycleState,
    pub(crate) queue: PriorityQueue,
}

impl SubscriberCore {
    pub(crate) fn new() -> Self {
        Self {
            id: SubscriberId::next(),
            status: LifecycleState::new(),
            queue: PriorityQueue::new(),
        }
    }
}

pub(crate) fn register(sink: Arc<dyn EventSink>) -> Result<(), EventBusError> {
    Dispatcher::instance().subscribe(sink)
}

pub(crate) fn deregister(id: SubscriberId) {
    Dispatcher::instance().unsubscribe(id);
}
