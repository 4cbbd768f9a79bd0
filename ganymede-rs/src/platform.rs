//! Provides a tiny DI like container which keeps all central components of a node.
//!
//! The platform is more or less a simple map which keeps components like the
//! [Config](crate::config::Config), the [Groups](crate::group::Groups) registry or the
//! [HttpPool](crate::http::HttpPool) as **Arc<T>** around. Instead of hiding the registry of all
//! groups in a global variable, it is owned by the platform and handed to whoever needs it. This
//! also permits to run several independent nodes within a single process (which is what the
//! integration tests do).
//!
//! The platform also keeps the central **is_running** flag which is toggled to *false* once
//! [Platform::terminate](Platform::terminate) is invoked. Once this happened, all components are
//! dropped and [Platform::require](Platform::require) will panic. Code which might run during the
//! shutdown should therefore use [Platform::find](Platform::find) and handle the **None** case.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use ganymede::platform::Platform;
//! # use ganymede::group::Groups;
//! let platform = Platform::new();
//!
//! // Registers the registry of all groups...
//! platform.register::<Groups>(Arc::new(Groups::new()));
//!
//! // Obtains a reference to a previously registered component...
//! let groups = platform.require::<Groups>();
//! assert_eq!(groups.get_group("scores").is_none(), true);
//!
//! // By default the platform is running...
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated...
//! platform.terminate();
//! // All components are immediately released...
//! assert_eq!(platform.find::<Groups>().is_none(), true);
//!
//! // and the platform is no longer considered active...
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use std::sync::atomic::{AtomicBool, Ordering};

/// Provides a container to keep all central components of a node in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and empty platform.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a component.
    ///
    /// A component which has previously been registered for the same type is replaced.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered component.
    ///
    /// Note, if one knows for certain, that a component will be present,
    /// [Platform::require](Platform::require) can be used.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let services = self.services.lock().unwrap();
        services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered component.
    ///
    /// Note, once the node is shutting down, all components are evicted. Therefore this might
    /// panic even if it worked before [Platform::terminate](Platform::terminate) was invoked.
    ///
    /// # Panics
    /// Panics if the requested component isn't available. Requiring a component is therefore
    /// only done while wiring the node, where a missing component is a programming error:
    /// ```should_panic
    /// # use ganymede::platform::Platform;
    /// # use ganymede::http::HttpPool;
    /// let platform = Platform::new();
    ///
    /// // This will panic, as no peer pool has been installed...
    /// platform.require::<HttpPool>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if self.is_running() {
            match self.find::<T>() {
                Some(service) => service,
                None => panic!(
                    "A required component ({}) was not installed in the platform!",
                    std::any::type_name::<T>()
                ),
            }
        } else {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            )
        }
    }

    /// Determines if the node is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This will immediately release all components and thereby stop all event loops which
    /// check [is_running()](Platform::is_running).
    /// It will also toggle the [is_running()](Platform::is_running) flag to **false**.
    pub fn terminate(&self) {
        // Drop all components so that pools and registries are released (sooner or later)...
        self.services.lock().unwrap().clear();

        // Mark platform as halted...
        self.is_running.store(false, Ordering::Release);
    }
}
