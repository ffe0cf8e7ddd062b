//! Subscription registry and failure-isolated dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::warn;

use super::envelope::{Category, Envelope};

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type HandlerResult = Result<(), BoxError>;

type Handler = Arc<dyn Fn(&Envelope) -> HandlerResult + Send + Sync + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Slots {
    by_category: [Vec<(SubscriptionId, Handler)>; Category::COUNT],
}

struct Shared {
    next_id: AtomicU64,
    slots: RwLock<Slots>,
}

/// Category → callbacks mapping shared by the client facade and the push actor.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Shared>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of delivering one envelope to its subscribers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                slots: RwLock::new(Slots::default()),
            }),
        }
    }

    /// Register `handler` for `category`. The returned guard unsubscribes on drop.
    pub fn subscribe<F>(&self, category: Category, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_shared(category, Arc::new(handler))
    }

    /// Register one callback for several categories.
    pub fn subscribe_many<F>(&self, categories: &[Category], handler: F) -> Vec<Subscription>
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        categories
            .iter()
            .map(|category| self.subscribe_shared(*category, Arc::clone(&handler)))
            .collect()
    }

    fn subscribe_shared(&self, category: Category, handler: Handler) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_category[category.index()]
            .push((id, handler));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            category,
            id,
            armed: true,
        }
    }

    /// Remove a subscription; unknown ids are ignored.
    pub fn unsubscribe(&self, category: Category, id: SubscriptionId) {
        remove(&self.inner, category, id);
    }

    pub fn subscriber_count(&self, category: Category) -> usize {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_category[category.index()]
            .len()
    }

    /// Invoke every callback currently registered for the envelope's category.
    ///
    /// The handler list is snapshotted first, so callbacks may (un)subscribe re-entrantly. A
    /// callback that errors or panics is reported and the remaining callbacks still run.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_category[envelope.category.index()]
            .clone();

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(
                        category = %envelope.category,
                        seq = ?envelope.seq,
                        subscription = id.0,
                        error = %err,
                        "subscriber callback failed"
                    );
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        category = %envelope.category,
                        seq = ?envelope.seq,
                        subscription = id.0,
                        panic = panic_message(panic.as_ref()),
                        "subscriber callback panicked"
                    );
                }
            }
        }
        report
    }
}

fn remove(shared: &Shared, category: Category, id: SubscriptionId) {
    shared
        .slots
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .by_category[category.index()]
        .retain(|(existing, _)| *existing != id);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it unsubscribes; call [`Subscription::detach`] to keep the callback registered for the
/// lifetime of the registry.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    registry: Weak<Shared>,
    category: Category,
    id: SubscriptionId,
    armed: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Some(shared) = self.registry.upgrade() {
            remove(&shared, self.category, self.id);
        }
    }

    pub fn detach(mut self) -> SubscriptionId {
        self.armed = false;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("category", &self.category)
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}
