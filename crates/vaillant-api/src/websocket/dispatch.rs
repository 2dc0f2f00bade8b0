// Handler slots for the two client events.
//
// Each event has one sync and one async slot. Registering replaces the
// slot's occupant; at dispatch time the async handler wins and the sync one
// is skipped.

use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use super::protocol::AttrMap;

pub type SubscribeHandler = Arc<dyn Fn(&AttrMap) + Send + Sync>;
pub type AsyncSubscribeHandler = Arc<dyn Fn(AttrMap) -> BoxFuture<'static, ()> + Send + Sync>;
pub type UpdateHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;
pub type AsyncUpdateHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Slots {
    on_subscribe: Option<SubscribeHandler>,
    async_on_subscribe: Option<AsyncSubscribeHandler>,
    on_update: Option<UpdateHandler>,
    async_on_update: Option<AsyncUpdateHandler>,
}

/// Routes subscribe/update events to at most one handler each.
#[derive(Default)]
pub struct Dispatcher {
    slots: RwLock<Slots>,
}

/// Which handler a dispatch resolved to. Cloned out of the lock so no
/// guard is held across the await.
enum Resolved<S, A> {
    Sync(S),
    Async(A),
    None,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_subscribe(&self, handler: SubscribeHandler) {
        self.slots.write().expect("dispatcher lock poisoned").on_subscribe = Some(handler);
    }

    pub fn set_async_on_subscribe(&self, handler: AsyncSubscribeHandler) {
        self.slots.write().expect("dispatcher lock poisoned").async_on_subscribe = Some(handler);
    }

    pub fn set_on_update(&self, handler: UpdateHandler) {
        self.slots.write().expect("dispatcher lock poisoned").on_update = Some(handler);
    }

    pub fn set_async_on_update(&self, handler: AsyncUpdateHandler) {
        self.slots.write().expect("dispatcher lock poisoned").async_on_update = Some(handler);
    }

    /// Fire the subscribe event with the full attribute mapping.
    pub async fn subscribe(&self, attrs: &AttrMap) {
        let resolved = {
            let slots = self.slots.read().expect("dispatcher lock poisoned");
            match (&slots.async_on_subscribe, &slots.on_subscribe) {
                (Some(handler), _) => Resolved::Async(Arc::clone(handler)),
                (None, Some(handler)) => Resolved::Sync(Arc::clone(handler)),
                (None, None) => Resolved::None,
            }
        };

        match resolved {
            Resolved::Async(handler) => handler(attrs.clone()).await,
            Resolved::Sync(handler) => handler(attrs),
            Resolved::None => trace!("no subscribe handler registered"),
        }
    }

    /// Fire the update event with an event name and its payload.
    pub async fn update(&self, event: &str, payload: &Value) {
        let resolved = {
            let slots = self.slots.read().expect("dispatcher lock poisoned");
            match (&slots.async_on_update, &slots.on_update) {
                (Some(handler), _) => Resolved::Async(Arc::clone(handler)),
                (None, Some(handler)) => Resolved::Sync(Arc::clone(handler)),
                (None, None) => Resolved::None,
            }
        };

        match resolved {
            Resolved::Async(handler) => handler(event.to_owned(), payload.clone()).await,
            Resolved::Sync(handler) => handler(event, payload),
            Resolved::None => trace!(name = event, "no update handler registered"),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read().expect("dispatcher lock poisoned");
        f.debug_struct("Dispatcher")
            .field("on_subscribe", &slots.on_subscribe.is_some())
            .field("async_on_subscribe", &slots.async_on_subscribe.is_some())
            .field("on_update", &slots.on_update.is_some())
            .field("async_on_update", &slots.async_on_update.is_some())
            .finish()
    }
}
