// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A type-indexed event bus with detachable listeners.
//!
//! Events are plain types; handlers subscribe to the event type they care
//! about and are recorded together with an owner type, so that a worker can
//! detach everything it registered in one call when it shuts down.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::RwLock,
};

type Handler<'a> = Box<dyn Fn(&dyn Any) + Send + Sync + 'a>;

struct Subscription<'a> {
    owner: TypeId,
    handler: Handler<'a>,
}

impl<'a> Subscription<'a> {
    fn new<W: Any, E: Any, F: Fn(&E) + Send + Sync + 'a>(handler: F) -> Self {
        Self {
            owner: TypeId::of::<W>(),
            // The registry is keyed by the event type, so the downcast holds
            // whenever this handler is reached.
            handler: Box::new(move |event| {
                if let Some(event) = event.downcast_ref::<E>() {
                    handler(event);
                }
            }),
        }
    }
}

/// Owner of the listeners that are never detached.
struct Everlasting;

/// An event bus.
#[derive(Default)]
pub struct Bus<'a> {
    subscriptions: RwLock<HashMap<TypeId, Vec<Subscription<'a>>>>,
}

impl<'a> Bus<'a> {
    /// Dispatches an event to every listener subscribed to its type, in
    /// subscription order. Only the read lock is taken, so handlers are free
    /// to dispatch follow-up events themselves.
    pub fn dispatch<E: Any>(&self, event: E) {
        let subscriptions = self.subscriptions.read().unwrap();

        if let Some(subscribers) = subscriptions.get(&TypeId::of::<E>()) {
            for subscription in subscribers {
                (subscription.handler)(&event);
            }
        }
    }

    /// Subscribes a handler to events of type `E` on behalf of the owner
    /// type `W`.
    pub fn add_listener<W: Any, E: Any, F: Fn(&E) + Send + Sync + 'a>(&self, handler: F) {
        self.subscriptions
            .write()
            .unwrap()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription::new::<W, E, F>(handler));
    }

    /// Subscribes a handler that stays attached for the lifetime of the bus.
    pub fn add_static_listener<E: Any, F: Fn(&E) + Send + Sync + 'a>(&self, handler: F) {
        self.add_listener::<Everlasting, E, F>(handler);
    }

    /// Detaches every listener subscribed on behalf of the given owner type.
    pub fn purge_listeners(&self, owner: TypeId) {
        for subscribers in self.subscriptions.write().unwrap().values_mut() {
            subscribers.retain(|subscription| subscription.owner != owner);
        }
    }
}
