//! Candidate peer addresses.
//!
//! Addresses arrive from DNS seeds, configured bootstrap peers and `addr`
//! gossip. Each address is handed out once by [`AddressBook::pop`]; the
//! scheduler re-seeds from DNS when the book runs dry.

use rand::seq::SliceRandom;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Upper bound on queued candidates; gossip beyond this is dropped.
pub const MAX_BOOK_SIZE: usize = 4_096;

#[derive(Debug, Default)]
pub struct AddressBook {
    queue: VecDeque<SocketAddr>,
    queued: HashSet<SocketAddr>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue addresses not already queued. Returns how many were added.
    pub fn insert_many<I>(&mut self, addrs: I) -> usize
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut added = 0;
        for addr in addrs {
            if self.queue.len() >= MAX_BOOK_SIZE {
                break;
            }
            if addr.port() == 0 || addr.ip().is_unspecified() {
                continue;
            }
            if self.queued.insert(addr) {
                self.queue.push_back(addr);
                added += 1;
            }
        }
        added
    }

    /// Take the oldest candidate.
    pub fn pop(&mut self) -> Option<SocketAddr> {
        let addr = self.queue.pop_front()?;
        self.queued.remove(&addr);
        Some(addr)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Resolve DNS seeds on `port` and append `bootstrap` addresses.
///
/// Lookup failures are logged and skipped. The result is deduplicated and
/// shuffled so pools started together spread across seeds.
pub async fn resolve_seeds(seeds: &[String], port: u16, bootstrap: &[SocketAddr]) -> Vec<SocketAddr> {
    let mut seen = HashSet::new();
    let mut addrs: Vec<SocketAddr> = bootstrap.iter().copied().filter(|a| seen.insert(*a)).collect();

    for seed in seeds {
        let host = if seed.contains(':') {
            seed.clone()
        } else {
            format!("{seed}:{port}")
        };
        match tokio::net::lookup_host(host.as_str()).await {
            Ok(entries) => {
                let before = addrs.len();
                addrs.extend(entries.filter(|a| seen.insert(*a)));
                debug!(seed = %host, found = addrs.len() - before, "resolved dns seed");
            }
            Err(e) => warn!(seed = %host, error = %e, "dns seed lookup failed"),
        }
    }

    addrs.shuffle(&mut rand::thread_rng());
    addrs
}

/// Resolve seeds and fill `book`. Returns the number of new candidates.
pub async fn seed_from_dns(
    book: &parking_lot::Mutex<AddressBook>,
    seeds: &[String],
    port: u16,
    bootstrap: &[SocketAddr],
) -> usize {
    let addrs = resolve_seeds(seeds, port, bootstrap).await;
    book.lock().insert_many(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 18533))
    }

    #[test]
    fn insert_deduplicates() {
        let mut book = AddressBook::new();
        assert_eq!(book.insert_many([addr(1), addr(2), addr(1)]), 2);
        assert_eq!(book.insert_many([addr(2)]), 0);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn pop_is_fifo_and_allows_reinsert() {
        let mut book = AddressBook::new();
        book.insert_many([addr(1), addr(2)]);
        assert_eq!(book.pop(), Some(addr(1)));
        assert_eq!(book.insert_many([addr(1)]), 1);
        assert_eq!(book.pop(), Some(addr(2)));
        assert_eq!(book.pop(), Some(addr(1)));
        assert!(book.pop().is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn unroutable_entries_skipped() {
        let mut book = AddressBook::new();
        let zero_port = SocketAddr::from(([10, 0, 0, 1], 0));
        let unspecified = SocketAddr::from(([0, 0, 0, 0], 18533));
        assert_eq!(book.insert_many([zero_port, unspecified]), 0);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut book = AddressBook::new();
        let many = (0..MAX_BOOK_SIZE as u32 + 10)
            .map(|i| SocketAddr::from((std::net::Ipv4Addr::from(0x0A00_0000 + i + 1), 1)));
        assert_eq!(book.insert_many(many), MAX_BOOK_SIZE);
    }

    #[tokio::test]
    async fn bootstrap_only_seeding() {
        let book = parking_lot::Mutex::new(AddressBook::new());
        let added = seed_from_dns(&book, &[], 18533, &[addr(1), addr(1), addr(2)]).await;
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn literal_seed_resolves_without_dns() {
        let addrs = resolve_seeds(&["127.0.0.1:9000".to_string()], 1, &[]).await;
        assert_eq!(addrs, vec![SocketAddr::from(([127, 0, 0, 1], 9000))]);
    }
}
