// src/budget.rs
//! The global item budget shared by every chain of a run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};

/// Counts finalized records against an optional maximum.
///
/// A bounded budget holds one slot per record it may still emit. A chain
/// waits for a slot before fetching its product page and hands it back if it
/// ends without a record, so a waiting chain takes over. Emitting a record
/// consumes the slot. Once the maximum is reached the slots are closed and
/// every waiter comes back empty.
#[derive(Debug)]
pub struct CrawlBudget {
    max: Option<usize>,
    emitted: AtomicUsize,
    closed: AtomicBool,
    slots: Option<Semaphore>,
}

impl CrawlBudget {
    pub fn new(max: Option<usize>) -> Self {
        let slots = max.map(|max| {
            let slots = Semaphore::new(max.min(Semaphore::MAX_PERMITS));
            if max == 0 {
                slots.close();
            }
            slots
        });
        Self {
            max,
            emitted: AtomicUsize::new(0),
            closed: AtomicBool::new(max == Some(0)),
            slots,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether new result pages or product chains may still be started.
    pub fn can_start_more(&self) -> bool {
        !self.is_closed()
    }

    /// Waits for a free slot for a new chain. `None` once the budget has
    /// closed, including while waiting.
    pub async fn start(&self) -> Option<ChainPermit<'_>> {
        if self.is_closed() {
            return None;
        }
        let slot = match &self.slots {
            Some(slots) => Some(slots.acquire().await.ok()?),
            None => None,
        };
        if self.is_closed() {
            return None;
        }
        Some(ChainPermit { budget: self, slot })
    }

    /// Counts one finalized record. Returns true when this call closed the
    /// budget.
    pub fn record_emitted(&self) -> bool {
        let now = self.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        match self.max {
            Some(max) if now >= max => {
                let closed_now = !self.closed.swap(true, Ordering::SeqCst);
                if let Some(slots) = &self.slots {
                    slots.close();
                }
                closed_now
            }
            _ => false,
        }
    }
}

/// A budget slot held by one chain.
///
/// [`ChainPermit::emitted`] converts it into a counted record; dropping it
/// without that frees the slot for another product.
#[derive(Debug)]
pub struct ChainPermit<'a> {
    budget: &'a CrawlBudget,
    slot: Option<SemaphorePermit<'a>>,
}

impl ChainPermit<'_> {
    /// Records the chain's emitted record. Returns true when this closed the
    /// budget.
    pub fn emitted(mut self) -> bool {
        if let Some(slot) = self.slot.take() {
            slot.forget();
        }
        self.budget.record_emitted()
    }
}
