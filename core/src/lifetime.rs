//! Keeping an owner alive while its work is in flight.
//!
//! A producer built from a client usually only holds a `Weak` reference to
//! it, so the client can go away while nobody is using it. Once a
//! subscription starts, though, the client must survive until the call
//! terminates even if the caller dropped its last `Arc`. `LifetimeToken` is
//! that temporary strong hold. It is parked in the subscription's
//! `Disposable`, which releases it exactly once, on the terminal event or
//! on caller disposal, whichever comes first.

use std::sync::{Arc, Weak};

use crate::signal::SignalProducer;

/// A strong hold on an owner for the duration of one subscription.
#[derive(Debug)]
pub struct LifetimeToken<O: ?Sized> {
    owner: Arc<O>,
}

impl<O: ?Sized> LifetimeToken<O> {
    /// Take a hold on `owner`, or `None` if it is already gone.
    pub fn acquire(owner: &Weak<O>) -> Option<Self> {
        owner.upgrade().map(|owner| Self { owner })
    }

    pub fn owner(&self) -> &Arc<O> {
        &self.owner
    }

    pub fn release(self) {
        tracing::trace!(
            remaining = Arc::strong_count(&self.owner) - 1,
            "releasing owner held by finished subscription"
        );
    }
}

impl<T, E> SignalProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Hold `owner` from `start` until the subscription terminates.
    ///
    /// Nothing is held before `start`. A subscription started after the
    /// owner is gone is interrupted without running this producer.
    pub fn retain_while_working<O>(self, owner: Weak<O>) -> Self
    where
        O: ?Sized + Send + Sync + 'static,
    {
        SignalProducer::new(move |observer, disposable| {
            let Some(token) = LifetimeToken::acquire(&owner) else {
                tracing::trace!("owner dropped before start; interrupting");
                observer.send_interrupted();
                return;
            };
            disposable.add(move || token.release());
            self.start_with(observer, disposable);
        })
    }
}
