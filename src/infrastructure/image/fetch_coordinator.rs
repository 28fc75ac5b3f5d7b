//! De-duplication of concurrent fetches for the same key.
//!
//! The first caller for a key spawns the shared operation; later callers
//! attach to it. Each caller holds its own [`FetchTicket`]. The shared
//! operation is aborted only once every ticket for it has been dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};

type Outcome<T> = Option<CacheResult<T>>;

struct InFlight<T> {
    id: u64,
    outcome: watch::Receiver<Outcome<T>>,
    waiters: usize,
    task: AbortHandle,
}

struct FlightTable<T> {
    flights: HashMap<CacheKey, InFlight<T>>,
    next_id: u64,
}

impl<T> FlightTable<T> {
    /// Removes the flight for `key` if it is still the one identified by `id`.
    fn remove_if_current(&mut self, key: &CacheKey, id: u64) -> Option<InFlight<T>> {
        if self.flights.get(key).is_some_and(|f| f.id == id) {
            self.flights.remove(key)
        } else {
            None
        }
    }
}

/// Tracks one shared, cancellable fetch per key.
pub struct FetchCoordinator<T> {
    table: Arc<Mutex<FlightTable<T>>>,
}

impl<T> Clone for FetchCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T> Default for FetchCoordinator<T> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(FlightTable {
                flights: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<T> std::fmt::Debug for FetchCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.table.lock().flights.len())
            .finish()
    }
}

impl<T> FetchCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the value for `key`, sharing any request already in flight.
    ///
    /// `loader` is only invoked when no request for `key` is in flight.
    /// Dropping the returned future withdraws this caller's interest.
    ///
    /// # Errors
    /// Returns the loader's error, or [`CacheError::Cancelled`] if the shared
    /// operation ended without producing a result.
    pub async fn fetch<F, Fut>(&self, key: &CacheKey, loader: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        self.join(key, loader).wait().await
    }

    /// Attaches to the in-flight request for `key`, starting one if needed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join<F, Fut>(&self, key: &CacheKey, loader: F) -> FetchTicket<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let mut table = self.table.lock();

        if let Some(flight) = table.flights.get_mut(key) {
            flight.waiters += 1;
            trace!(key = %key, waiters = flight.waiters, "Joined in-flight fetch");
            return FetchTicket {
                key: key.clone(),
                id: flight.id,
                outcome: flight.outcome.clone(),
                table: Arc::clone(&self.table),
            };
        }

        let operation = loader();
        let id = table.next_id;
        table.next_id += 1;

        let (tx, rx) = watch::channel(None);
        let guard_table = Arc::clone(&self.table);
        let guard_key = key.clone();

        // The guard locks the table on drop, so it only exists once the task runs.
        let task = tokio::spawn(async move {
            let guard = FlightGuard {
                table: guard_table,
                key: guard_key,
                id,
            };
            let result = operation.await;
            drop(guard);
            tx.send_replace(Some(result));
        });

        debug!(key = %key, "Started shared fetch");
        table.flights.insert(
            key.clone(),
            InFlight {
                id,
                outcome: rx.clone(),
                waiters: 1,
                task: task.abort_handle(),
            },
        );

        FetchTicket {
            key: key.clone(),
            id,
            outcome: rx,
            table: Arc::clone(&self.table),
        }
    }

    /// Returns the number of keys with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.table.lock().flights.len()
    }

    /// Returns true if a fetch for `key` is in flight.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.table.lock().flights.contains_key(key)
    }

    /// Returns the number of callers attached to the fetch for `key`.
    pub fn waiters(&self, key: &CacheKey) -> usize {
        self.table
            .lock()
            .flights
            .get(key)
            .map_or(0, |flight| flight.waiters)
    }
}

/// Removes a flight from the table when its task finishes, panics or is aborted.
struct FlightGuard<T> {
    table: Arc<Mutex<FlightTable<T>>>,
    key: CacheKey,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.table.lock().remove_if_current(&self.key, self.id);
    }
}

/// One caller's interest in a shared fetch.
///
/// Dropping the ticket (or calling [`FetchTicket::cancel`]) stops this caller
/// from waiting. The last ticket to go cancels the shared operation.
pub struct FetchTicket<T> {
    key: CacheKey,
    id: u64,
    outcome: watch::Receiver<Outcome<T>>,
    table: Arc<Mutex<FlightTable<T>>>,
}

impl<T: Clone> FetchTicket<T> {
    /// Returns the key this ticket waits on.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the shared outcome.
    ///
    /// # Errors
    /// Returns the shared failure, or [`CacheError::Cancelled`] if the
    /// operation was aborted or panicked.
    pub async fn wait(mut self) -> CacheResult<T> {
        let outcome = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(CacheError::Cancelled))
    }

    /// Withdraws interest without waiting.
    pub fn cancel(self) {}
}

impl<T> Drop for FetchTicket<T> {
    fn drop(&mut self) {
        let abandoned = {
            let mut table = self.table.lock();
            let Some(flight) = table.flights.get_mut(&self.key) else {
                return;
            };
            if flight.id != self.id {
                return;
            }
            flight.waiters -= 1;
            if flight.waiters > 0 {
                return;
            }
            table.remove_if_current(&self.key, self.id)
        };

        if let Some(flight) = abandoned {
            flight.task.abort();
            debug!(key = %self.key, "Last waiter left, cancelled shared fetch");
        }
    }
}
