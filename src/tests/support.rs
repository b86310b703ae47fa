//! Helpers shared by the crate's tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::broker::MemoryBroker;
use crate::pubsub::{InstanceIdentity, MessageContext, Publisher, SharedHandler, handler_fn};
use crate::topic::TopicCache;
use crate::utils::error::HandlerError;

pub(crate) type Seen = Arc<Mutex<Vec<MessageContext>>>;

/// Polls `cond` until it holds, failing the test after two seconds.
pub(crate) async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// A publisher for `identity` with its own topic cache over `broker`.
pub(crate) fn publisher(broker: &MemoryBroker, identity: &str) -> Publisher {
    Publisher::new(
        TopicCache::new(Arc::new(broker.clone())),
        InstanceIdentity::new(identity),
    )
}

/// A handler that records every context it is given.
pub(crate) fn recording_handler() -> (SharedHandler, Seen) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |ctx: MessageContext| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(ctx);
            Ok::<(), HandlerError>(())
        }
    });
    (handler, seen)
}

/// A handler that always fails.
pub(crate) fn failing_handler() -> (SharedHandler, Seen) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |ctx: MessageContext| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(ctx);
            Err::<(), HandlerError>("handler rejected the message".into())
        }
    });
    (handler, seen)
}
