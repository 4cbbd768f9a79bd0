//! Ganymede is a distributed, read-through, in-memory cache for immutable values.
//!
//! # Introduction
//! Each node of a **Ganymede** cluster caches the values of one or more **groups**. A group is a
//! named cache namespace which knows how to produce a missing value, as it is backed by a
//! [Getter](group::Getter) (e.g. a query against a slow database). Values are never modified or
//! deleted, they are only evicted once the memory budget of a group is exhausted.
//!
//! All nodes agree on the owner of a key by placing all members of the cluster on a consistent
//! [HashRing](ring::HashRing). If a node misses a key which is owned by another node, it fetches
//! the value from the owner (via HTTP) instead of loading it on its own. Therefore each value is
//! loaded (and cached) by a single node of the cluster, no matter which node is asked for it.
//!
//! # Features
//! * **Memory bounded LRU caches** which account for the size of keys and values
//!   (see [lru]).
//! * **Coalescing of concurrent loads**. No matter how many clients miss the same key at once,
//!   the value is only loaded once (see [singleflight]).
//! * **100% Async/Await** - loading values, talking to peers and serving requests all build upon
//!   [tokio](https://tokio.rs/) and [hyper](https://hyper.rs/).
//! * **Reload-aware config facility** which permits to change the list of peers or the bind
//!   address during operation. Therefore, no restart is ever required, which is kind of important
//!   for a cache which would lose all its contents.
//!
//! # Modules
//! * [byte_span]: the immutable value type handed out by the cache.
//! * [lru] and [lru::synced]: the memory bounded cache of each group.
//! * [ring]: consistent hashing of keys onto peers.
//! * [singleflight]: de-duplication of concurrent loads.
//! * [group]: the orchestration of cache, peers and getters as well as the registry of groups.
//! * [peers] and [http]: fetching values from other nodes and serving values to them.
//!
//! # Examples
//! A short example on how to initialize the library can be found here [Builder](builder::Builder).
//! A complete node driven by a config file is provided by the **ganymede-io** crate.
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byte_span;
pub mod config;
pub mod fmt;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod platform;
pub mod ring;
pub mod signals;
pub mod singleflight;

/// Contains the version of the Ganymede library.
pub const GANYMEDE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Ganymede build being used.
pub const GANYMEDE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned closure to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ganymede;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}

#[cfg(test)]
mod testing {
    use std::sync::Mutex;

    lazy_static::lazy_static! {
        /// Provides a global lock which has to be acquired if a test operates on shared
        /// resources. These are our test ports (1503 and 1504) on which we start local
        /// nodes for integration tests. Using this lock, we can still execute all other
        /// tests in parallel and only block if required.
        pub static ref SHARED_TEST_RESOURCES: Mutex<()> = Mutex::new(());
    }

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }
}
