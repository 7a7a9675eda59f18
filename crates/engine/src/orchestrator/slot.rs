use askpage_common::ids::PublisherId;

use crate::store::{PublisherStore, StoreError};

/// Scoped handle for the blog slot a job holds from enqueue to terminal
/// state.
///
/// Exactly one of [`commit`](Self::commit),
/// [`release_unprocessed`](Self::release_unprocessed), or
/// [`keep`](Self::keep) must be called on every path:
/// - `commit` — the blog was processed; the slot converts into a processed
///   blog.
/// - `release_unprocessed` — terminal without processing (skip).
/// - `keep` — transient failure; the job will run again, so the
///   reservation stays held.
///
/// Dropping an armed handle is a bug and is logged as one.
pub struct SlotReservation {
    store: PublisherStore,
    publisher_id: PublisherId,
    armed: bool,
}

impl SlotReservation {
    /// Wrap the reservation made for `publisher_id` at enqueue time.
    pub fn new(store: PublisherStore, publisher_id: PublisherId) -> Self {
        Self {
            store,
            publisher_id,
            armed: true,
        }
    }

    /// Release the slot and count the blog as processed.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.armed = false;
        self.store.release_blog_slot(self.publisher_id, true).await
    }

    /// Release the slot without counting it.
    pub async fn release_unprocessed(mut self) -> Result<(), StoreError> {
        self.armed = false;
        self.store.release_blog_slot(self.publisher_id, false).await
    }

    /// Leave the reservation held across a retryable failure.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(
                publisher_id = %self.publisher_id,
                "Slot reservation dropped without an explicit disposition"
            );
        }
    }
}
