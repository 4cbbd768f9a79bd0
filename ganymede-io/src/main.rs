//! Runs a cache node which serves the groups defined in **config/settings.yml**.
//!
//! Each entry of the **groups** section becomes a group. Its values are provided by the static
//! **data** map of the entry, which stands in for a slow database:
//! ```yaml
//! groups:
//!     scores:
//!         max_memory: 2k
//!         data:
//!             Tom: 630
//!             Jack: 589
//! ```
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ganymede::builder::Builder;
use ganymede::config::Config;
use ganymede::fmt::parse_size;
use ganymede::group::{Getter, Groups};
use ganymede::http::HttpPool;
use yaml_rust::Yaml;

const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;

/// Serves the values of a group from its static data map.
struct StaticData {
    group: String,
    data: HashMap<String, String>,
}

#[async_trait]
impl Getter for StaticData {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        log::info!("[SlowDB] Searching {} in {}...", key, self.group);
        match self.data.get(key) {
            Some(value) => Ok(value.as_bytes().to_vec()),
            None => Err(anyhow::anyhow!("{} not exist", key)),
        }
    }
}

fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(string) => Some(string.clone()),
        Yaml::Integer(number) => Some(number.to_string()),
        Yaml::Real(number) => Some(number.clone()),
        Yaml::Boolean(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn read_data(data: &Yaml) -> HashMap<String, String> {
    data.as_hash()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(key, value)| {
                    Some((scalar_to_string(key)?, scalar_to_string(value)?))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn max_memory(group: &str, setting: &Yaml) -> usize {
    let max_memory = match setting {
        Yaml::BadValue => return DEFAULT_MAX_MEMORY,
        Yaml::Integer(bytes) if *bytes >= 0 => Ok(*bytes as usize),
        Yaml::String(size) => parse_size(size),
        _ => Err(anyhow::anyhow!("Expected a size like '64m'.")),
    };

    max_memory.unwrap_or_else(|error| {
        log::error!(
            "Invalid max_memory for group {}: {:#}. Using the default.",
            group,
            error
        );
        DEFAULT_MAX_MEMORY
    })
}

fn create_groups(config: &Config, groups: &Groups, pool: &Arc<HttpPool>) {
    let handle = config.current();
    let definitions = match handle.query("groups").as_hash() {
        Some(definitions) => definitions,
        None => {
            log::warn!("No groups are defined in the config. This node will only serve peers.");
            return;
        }
    };

    for (name, definition) in definitions {
        if let Some(name) = name.as_str() {
            let getter = Arc::new(StaticData {
                group: name.to_owned(),
                data: read_data(&definition["data"]),
            });
            let cache_bytes = max_memory(name, &definition["max_memory"]);
            let group = groups.new_group(name, cache_bytes, getter);
            group.register_peers(pool.clone());
        }
    }
}

#[tokio::main]
async fn main() {
    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;

    // Create the groups defined in the config and connect them to the peers...
    let pool = platform.require::<HttpPool>();
    create_groups(
        &platform.require::<Config>(),
        &platform.require::<Groups>(),
        &pool,
    );

    pool.event_loop().await;
}

#[cfg(test)]
mod tests {
    use crate::{max_memory, read_data, DEFAULT_MAX_MEMORY};
    use yaml_rust::YamlLoader;

    #[test]
    fn group_definitions_are_parsed() {
        let docs = YamlLoader::load_from_str(
            "
scores:
    max_memory: 2k
    data:
        Tom: 630
        Jack: '589'
        ratio: 1.5
ages:
    max_memory: 100
invalid:
    max_memory: lots
",
        )
        .unwrap();
        let groups = &docs[0];

        let data = read_data(&groups["scores"]["data"]);
        assert_eq!(data.len(), 3);
        assert_eq!(data["Tom"], "630");
        assert_eq!(data["Jack"], "589");
        assert_eq!(data["ratio"], "1.5");
        assert!(read_data(&groups["ages"]["data"]).is_empty());

        assert_eq!(max_memory("scores", &groups["scores"]["max_memory"]), 2048);
        assert_eq!(max_memory("ages", &groups["ages"]["max_memory"]), 100);
        assert_eq!(
            max_memory("invalid", &groups["invalid"]["max_memory"]),
            DEFAULT_MAX_MEMORY
        );
        assert_eq!(
            max_memory("unknown", &groups["unknown"]["max_memory"]),
            DEFAULT_MAX_MEMORY
        );
    }
}
