//! Environment configuration and seed loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matukana_sync::{Collection, Record};

use crate::error::{Error, Result};

/// Log filter used when neither `RUST_LOG` nor `MATUKANA_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "matukana_admin=info,matukana_sync=info";

/// Admin tool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminConfig {
    /// JSON file to seed the store from.
    pub seed: Option<PathBuf>,
    /// Collections to open.
    pub collections: Vec<Collection>,
    /// Simulated latency on every store call.
    pub store_latency: Duration,
    /// Tracing filter directive.
    pub log_filter: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            seed: None,
            collections: Collection::ALL.to_vec(),
            store_latency: Duration::ZERO,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AdminConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let seed = var("MATUKANA_SEED")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let collections = match var("MATUKANA_COLLECTIONS") {
            Some(list) => parse_collections(&list)?,
            None => defaults.collections,
        };

        let store_latency = match var("MATUKANA_STORE_LATENCY_MS") {
            Some(ms) => ms
                .trim()
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| {
                    Error::Config(format!("MATUKANA_STORE_LATENCY_MS: {ms:?} is not a number"))
                })?,
            None => defaults.store_latency,
        };

        let log_filter = var("MATUKANA_LOG").unwrap_or(defaults.log_filter);

        Ok(Self {
            seed,
            collections,
            store_latency,
            log_filter,
        })
    }
}

fn parse_collections(list: &str) -> Result<Vec<Collection>> {
    let mut collections = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let collection: Collection = name
            .parse()
            .map_err(|_| {
                Error::Config(format!("MATUKANA_COLLECTIONS: unknown collection {name:?}"))
            })?;
        if !collections.contains(&collection) {
            collections.push(collection);
        }
    }
    if collections.is_empty() {
        return Err(Error::Config("MATUKANA_COLLECTIONS is empty".into()));
    }
    Ok(collections)
}

/// Load a seed file: a JSON object keyed by collection name, each holding an
/// array of records.
///
/// ```json
/// { "inquiries": [{ "id": "q1", "status": "new", "created_at": 1, "item_name": "Reiki" }] }
/// ```
pub fn load_seed(path: &Path) -> Result<HashMap<Collection, Vec<Record>>> {
    let text = std::fs::read_to_string(path)?;
    let raw: HashMap<String, Vec<Record>> = serde_json::from_str(&text)?;
    raw.into_iter()
        .map(|(name, records)| {
            let collection: Collection = name
                .parse()
                .map_err(|_| Error::Config(format!("seed: unknown collection {name:?}")))?;
            Ok((collection, records))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn defaults_when_unset() {
        let config = AdminConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AdminConfig::default());
        assert_eq!(config.collections.len(), 5);
    }

    #[test]
    fn reads_variables() {
        let vars = [
            ("MATUKANA_SEED", "./seed.json"),
            ("MATUKANA_COLLECTIONS", "inquiries, products,inquiries"),
            ("MATUKANA_STORE_LATENCY_MS", "25"),
            ("MATUKANA_LOG", "debug"),
        ];
        let config = AdminConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.seed, Some(PathBuf::from("./seed.json")));
        assert_eq!(config.collections, vec![Collection::Inquiries, Collection::Products]);
        assert_eq!(config.store_latency, Duration::from_millis(25));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let bad_latency = [("MATUKANA_STORE_LATENCY_MS", "soon")];
        assert!(matches!(
            AdminConfig::from_lookup(lookup(&bad_latency)),
            Err(Error::Config(_))
        ));

        let bad_collection = [("MATUKANA_COLLECTIONS", "inquiries,users")];
        assert!(matches!(
            AdminConfig::from_lookup(lookup(&bad_collection)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn loads_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "inquiries": [
                    {{ "id": "q1", "status": "new", "created_at": 3, "item_name": "Reiki" }}
                ],
                "gallery": []
            }}"#
        )
        .unwrap();

        let seed = load_seed(file.path()).unwrap();
        assert_eq!(seed[&Collection::Inquiries][0].id.as_str(), "q1");
        assert!(seed[&Collection::Gallery].is_empty());
    }
}
