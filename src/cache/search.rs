use std::sync::atomic::{AtomicU64, Ordering};

/// Ticket identifying one issued search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// Sequence guard for overlapping searches.
///
/// Each search takes a ticket before it starts; when it finishes, its results
/// are only surfaced if no newer search has been issued since.
#[derive(Debug, Default)]
pub struct SearchGuard {
    latest: AtomicU64,
}

impl SearchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> SearchTicket {
        SearchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, ticket: SearchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}
