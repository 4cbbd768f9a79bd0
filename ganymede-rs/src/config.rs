//! Loads the node settings from **config/settings.yml** and keeps them current.
//!
//! The file is polled every two seconds. Once its modification date moves forward it is parsed
//! again and, if valid, swapped in and announced via [Config::notifier]. A file which fails to
//! parse is reported and the previous settings stay in effect.
//!
//! The document contains three sections. **server** selects the bind address of the peer
//! endpoint, **peers** describes the cluster (see [http](crate::http)) and **groups** lists the
//! groups created by the node binary:
//! ```yaml
//! server:
//!     port: 8001
//! peers:
//!     members:
//!         - http://10.0.0.1:8001
//! groups:
//!     scores:
//!         max_memory: 64m
//! ```
//!
//! A [Handle] is a snapshot. Components which follow changes keep the [Config] itself and fetch a
//! fresh handle whenever the notifier fires.
//!
//! # Example
//! ```
//! # use ganymede::builder::Builder;
//! # use ganymede::config::Config;
//! # #[tokio::main]
//! # async fn main() {
//! # let platform = Builder::new().enable_config().build().await;
//! let config = platform.require::<Config>();
//! config.load_from_string("peers:\n    replicas: 25", None).unwrap();
//!
//! let replicas = config.current().query("peers.replicas").as_i64().unwrap_or(50);
//! assert_eq!(replicas, 25);
//! # }
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::platform::Platform;

/// Specifies the settings file read by [install].
pub const SETTINGS_FILE: &str = "config/settings.yml";

/// Holds the current settings of a node.
///
/// Installed by the [Builder](crate::builder::Builder) and fetched via
/// `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Receives a message whenever new settings have been swapped in. The message carries no data.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// A snapshot of the settings at the time it was obtained.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates an empty config which reads its settings from **file** once loaded.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Subscribes to change announcements.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Returns the currently active settings.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Returns the modification date of the settings file or **None** if it isn't a regular file
    /// (a docker volume which isn't mounted shows up as directory).
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|metadata| metadata.is_file())
            .and_then(|metadata| metadata.modified().ok())
    }

    /// Reads and applies the settings file.
    ///
    /// A missing file is skipped silently so that a node can start with defaults.
    pub async fn load(&self) -> anyhow::Result<()> {
        let last_modified = match self.last_modified().await {
            Some(last_modified) => last_modified,
            None => {
                log::info!("No settings found in {}. Using defaults.", &self.filename);
                return Ok(());
            }
        };

        log::info!("Loading settings from {}...", &self.filename);
        let data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot read {}", &self.filename))?;

        self.load_from_string(data.as_str(), Some(last_modified))
    }

    /// Determines if the settings file has been modified since it was applied.
    async fn is_outdated(&self) -> bool {
        let last_loaded = self.config.load().1;
        match self.last_modified().await {
            Some(last_modified) => last_loaded.map_or(true, |loaded| last_modified > loaded),
            None => false,
        }
    }

    /// Parses and applies the given YAML text as if it had been read from the settings file.
    ///
    /// Malformed input is rejected and leaves the current settings untouched.
    ///
    /// # Example
    ///
    /// ```
    /// # use ganymede::config::Config;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("
    /// server:
    ///     port: 12345
    /// ", None).unwrap();
    ///
    /// assert_eq!(config.current().query("server.port").as_i64().unwrap(), 12345);
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse {}", &self.filename))?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Null,
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Nobody might be listening...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Returns the root of the settings document.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dotted path like **peers.replicas** against the currently loaded configuration.
    ///
    /// Yields **Yaml::BadValue** if any part of the path is missing.
    pub fn query(&self, query: impl AsRef<str>) -> &Yaml {
        query
            .as_ref()
            .split('.')
            .fold(&self.config.0, |node, key| &node[key])
    }
}

/// Loads the [SETTINGS_FILE] into a new [Config], registers it in the platform and starts
/// polling the file for changes.
///
/// Only the modification date is compared, so listeners re-read their whole section on every
/// change.
pub async fn install(platform: Arc<Platform>) -> Arc<Config> {
    if let Some(directory) = Path::new(SETTINGS_FILE).parent() {
        if let Err(error) = tokio::fs::create_dir_all(directory).await {
            log::warn!(
                "Cannot create the config directory {}: {}",
                directory.display(),
                error
            );
        }
    }

    let config = Arc::new(Config::new(SETTINGS_FILE));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    watch(platform, config.clone());

    config
}

#[cfg(test)]
fn watch(_platform: Arc<Platform>, _config: Arc<Config>) {
    // Tests provide their settings via load_from_string...
}

#[cfg(not(test))]
fn watch(platform: Arc<Platform>, config: Arc<Config>) {
    let _ = tokio::spawn(async move {
        while platform.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            if config.is_outdated().await {
                match config.load().await {
                    Ok(_) => log::info!("Settings have been reloaded."),
                    Err(error) => log::error!("Failed to reload the settings: {:#}", error),
                }
            }
        }
    });
}
