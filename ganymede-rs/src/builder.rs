//! Provides a builder which can be used to setup and initialize a cache node.
//!
//! This can be used to create and setup the central parts of a node. As Ganymede provides some
//! optional components, a builder permits to selectively enable or disable them.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use ganymede::builder::Builder;
//! # use ganymede::http::HttpPool;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Create groups here...
//!
//!     // Start serving requests of other nodes...
//!     platform.require::<HttpPool>().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::{init_logging, GANYMEDE_REVISION, GANYMEDE_VERSION};

/// Initializes a node by creating and initializing all core components.
///
/// As Ganymede provides a bunch of components of which some are optional, the actual setup
/// can be configured here.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_groups: bool,
    setup_peers: bool,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Builder {
            setup_logging: false,
            enable_signals: false,
            setup_config: false,
            setup_groups: false,
            setup_peers: false,
        }
    }

    /// Enables all features.
    ///
    /// Note that using this method (and then maybe disabling selected components) is quite
    /// convenient, but be aware that new components which might be added in a library update
    /// will then also be enabled by default. This might or might not be the expected behaviour.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_groups = true;
        self.setup_peers = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// Using this, we properly initialize **simplelog** to log to stdout. As we intend nodes
    /// to be run in docker containers, this is all that is needed for proper logging. The date
    /// format being used is digestible by established tools like **greylog**.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the node once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [config::Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Creates and installs an empty [Groups](crate::group::Groups) registry.
    pub fn enable_groups(mut self) -> Self {
        self.setup_groups = true;
        self
    }

    /// Disables setting up a **Groups** registry after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_groups(mut self) -> Self {
        self.setup_groups = false;
        self
    }

    /// Creates and installs an [HttpPool](crate::http::HttpPool) which is configured via the
    /// **peers** section of the config.
    ///
    /// Note that still, the event loop has to be invoked manually via:
    /// `platform.require::<HttpPool>().event_loop().await`. Also each group has to be connected
    /// to the pool via [register_peers](crate::group::Group::register_peers).
    pub fn enable_peers(mut self) -> Self {
        self.setup_peers = true;
        self
    }

    /// Disables setting up an **HttpPool** after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_peers(mut self) -> Self {
        self.setup_peers = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) registry with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. GANYMEDE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            GANYMEDE_VERSION,
            GANYMEDE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            let _ = crate::config::install(platform.clone()).await;
        }

        if self.setup_groups {
            let _ = crate::group::Groups::install(&platform);
        }

        if self.setup_peers {
            let _ = crate::http::install(&platform);
        }

        platform
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::Config;
    use crate::group::Groups;
    use crate::http::HttpPool;

    #[test]
    fn only_enabled_components_are_installed() {
        crate::testing::test_async(async {
            let platform = Builder::new().enable_groups().build().await;
            assert!(platform.find::<Groups>().is_some());
            assert!(platform.find::<Config>().is_none());
            assert!(platform.find::<HttpPool>().is_none());

            let platform = Builder::new()
                .enable_all()
                .disable_signals()
                .disable_peers()
                .build()
                .await;
            assert!(platform.find::<Groups>().is_some());
            assert!(platform.find::<Config>().is_some());
            assert!(platform.find::<HttpPool>().is_none());
        });
    }
}
