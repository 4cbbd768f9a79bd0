//! Coalesces concurrent calls for the same key into a single execution.
//!
//! If many clients miss the cache for the same key at once, only one of them should actually
//! load the value, while all others wait for its result. A [CallCoalescer] keeps one record per
//! key which is currently in flight. The first caller registers the record and runs the given
//! function, every subsequent caller for the same key waits until the result is published and then
//! receives a clone of it. Once the call is completed, the record is removed so that the next call
//! for this key executes the function again (results are never cached here, neither are failures).
//!
//! Calls for different keys don't affect each other at all.
//!
//! Note that there is neither a timeout nor a way to cancel a call. If the leading future is
//! dropped before it completes, its record is removed and all waiters receive an error.
//!
//! # Examples
//! ```
//! # use ganymede::singleflight::CallCoalescer;
//! # #[tokio::main]
//! # async fn main() {
//! let coalescer = CallCoalescer::new();
//! let value = coalescer
//!     .execute("Tom", || async { Ok("630".to_owned()) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, "630");
//! # }
//! ```
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Represents an error which is shared by all callers of a coalesced call.
///
/// This wraps the error of the leading call so that it can be handed to each waiter. Formatting
/// it yields the message of the original error.
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    /// Provides access to the original error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for SharedError {
    fn from(error: anyhow::Error) -> Self {
        SharedError(Arc::new(error))
    }
}

impl Display for SharedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl Debug for SharedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Contains the outcome of a call once it is completed.
type Outcome<T> = Option<Result<T, SharedError>>;

/// Deduplicates concurrent calls which share the same key.
pub struct CallCoalescer<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>,
}

/// Removes the record of a call once the leading caller is done (or has been dropped).
struct CallGuard<'a, T> {
    coalescer: &'a CallCoalescer<T>,
    key: &'a str,
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut calls) = self.coalescer.calls.lock() {
            let _ = calls.remove(self.key);
        }
    }
}

impl<T: Clone> Default for CallCoalescer<T> {
    fn default() -> Self {
        CallCoalescer::new()
    }
}

impl<T: Clone> CallCoalescer<T> {
    /// Creates a new coalescer without any calls in flight.
    pub fn new() -> Self {
        CallCoalescer {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given function unless a call for the same key is already in flight.
    ///
    /// If there is a call in flight, this waits for it to complete and returns its result
    /// instead of invoking **call**.
    pub async fn execute<F, Fut>(&self, key: &str, call: F) -> Result<T, SharedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let pending = {
            let mut calls = self.calls.lock().unwrap();
            match calls.get(key) {
                Some(receiver) => Err(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let _ = calls.insert(key.to_owned(), receiver);
                    Ok(sender)
                }
            }
        };

        match pending {
            Ok(sender) => {
                let _guard = CallGuard {
                    coalescer: self,
                    key,
                };

                let result = call().await.map_err(SharedError::from);
                let _ = sender.send_replace(Some(result.clone()));

                result
            }
            Err(receiver) => CallCoalescer::await_outcome(key, receiver).await,
        }
    }

    async fn await_outcome(
        key: &str,
        mut receiver: watch::Receiver<Outcome<T>>,
    ) -> Result<T, SharedError> {
        // The sender is dropped without publishing anything if the leading call was abandoned...
        let outcome = match receiver.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| Err(abandoned(key)))
    }

    /// Returns the number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn abandoned(key: &str) -> SharedError {
    SharedError::from(anyhow::anyhow!(
        "The call for '{}' was abandoned before it completed.",
        key
    ))
}
