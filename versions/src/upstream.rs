//! Latest upstream versions from release-monitoring.org (Anitya).

use crate::config::UpstreamConfig;
use chrono::{DateTime, Duration, Utc};
use javapkg_common::errors::*;
use javapkg_common::http;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub trait Monitoring: Sync {
    /// Latest version of the upstream project of a package, empty if it isn't monitored.
    fn latest_version(&self, package: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PackageItem {
    project: String,
}

#[derive(Debug, Deserialize)]
struct ProjectItem {
    version: Option<String>,
}

pub struct Anitya {
    client: http::Client,
    url: String,
    distribution: String,
}

impl Anitya {
    pub fn new(client: http::Client, config: &UpstreamConfig) -> Anitya {
        Anitya {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            distribution: config.distribution.clone(),
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Page<T>> {
        let url = format!("{}{}", self.url, path);
        debug!("Querying {:?} with {:?}", url, query);
        let page = self
            .client
            .get(&url)
            .query(query)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(page)
    }
}

impl Monitoring for Anitya {
    fn latest_version(&self, package: &str) -> Result<String> {
        let packages = self.get::<PackageItem>(
            "/api/v2/packages/",
            &[("name", package), ("distribution", self.distribution.as_str())],
        )?;
        let Some(item) = packages.items.into_iter().next() else {
            return Ok(String::new());
        };

        let projects = self.get::<ProjectItem>("/api/v2/projects/", &[("name", item.project.as_str())])?;
        Ok(projects
            .items
            .into_iter()
            .next()
            .and_then(|p| p.version)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: String,
    pub fetched: DateTime<Utc>,
}

/// Upstream versions of earlier runs, stored as JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Cache {
    entries: BTreeMap<String, CacheEntry>,
}

impl Cache {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Cache> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(buf) => {
                let cache = serde_json::from_slice(&buf)
                    .with_context(|| format!("Failed to parse upstream cache {:?}", path))?;
                Ok(cache)
            }
            Err(err) => {
                debug!("Starting with empty upstream cache, can't read {:?}: {}", path, err);
                Ok(Cache::default())
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let buf = serde_json::to_vec_pretty(self)?;
        fs::write(path, buf).with_context(|| format!("Failed to write upstream cache {:?}", path))?;
        Ok(())
    }

    pub fn get_fresh(&self, package: &str, now: DateTime<Utc>, ttl: Duration) -> Option<&str> {
        self.entries
            .get(package)
            .filter(|e| now.signed_duration_since(e.fetched) < ttl)
            .map(|e| e.version.as_str())
    }

    pub fn insert(&mut self, package: String, version: String, fetched: DateTime<Utc>) {
        self.entries.insert(package, CacheEntry { version, fetched });
    }
}

/// Look up the upstream versions of all packages, reusing fresh cache entries.
///
/// Lookups that fail are logged and reported as an empty version, they are not cached.
pub fn lookup_all<M: Monitoring>(
    monitoring: &M,
    packages: &[String],
    cache: &mut Cache,
    config: &UpstreamConfig,
    now: DateTime<Utc>,
) -> Result<HashMap<String, String>> {
    let ttl = Duration::hours(config.cache_ttl as i64);
    let mut versions = HashMap::new();
    let mut todo = Vec::new();
    for package in packages {
        match cache.get_fresh(package, now, ttl) {
            Some(version) => {
                versions.insert(package.clone(), version.to_string());
            }
            None => todo.push(package),
        }
    }
    info!(
        "Looking up {} upstream versions ({} cached)...",
        todo.len(),
        versions.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()?;
    let results = pool.install(|| {
        todo.par_iter()
            .map(|package| (*package, monitoring.latest_version(package)))
            .collect::<Vec<_>>()
    });

    for (package, result) in results {
        match result {
            Ok(version) => {
                cache.insert(package.clone(), version.clone(), now);
                versions.insert(package.clone(), version);
            }
            Err(err) => {
                warn!("Failed to look up upstream version of {:?}: {:#}", package, err);
                versions.insert(package.clone(), String::new());
            }
        }
    }

    Ok(versions)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Serves versions from a map, records which packages were asked for.
    #[derive(Default)]
    pub struct FakeMonitoring {
        pub versions: HashMap<String, String>,
        pub asked: Mutex<Vec<String>>,
    }

    impl Monitoring for FakeMonitoring {
        fn latest_version(&self, package: &str) -> Result<String> {
            self.asked.lock().unwrap().push(package.to_string());
            match self.versions.get(package) {
                Some(version) => Ok(version.clone()),
                None => bail!("HTTP status server error (502 Bad Gateway)"),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 3, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_parse_anitya_pages() -> Result<()> {
        let page: Page<PackageItem> = serde_json::from_str(
            r#"{"items": [{"distribution": "Fedora", "name": "maven", "project": "Apache Maven"}],
                "items_per_page": 25, "page": 1, "total_items": 1}"#,
        )?;
        assert_eq!(page.items[0].project, "Apache Maven");

        let page: Page<ProjectItem> = serde_json::from_str(
            r#"{"items": [{"id": 1894, "name": "Apache Maven", "version": null, "versions": []}],
                "items_per_page": 25, "page": 1, "total_items": 1}"#,
        )?;
        assert_eq!(page.items[0].version, None);
        Ok(())
    }

    #[test]
    fn test_cache_freshness() {
        let mut cache = Cache::default();
        cache.insert("maven".to_string(), "3.6.1".to_string(), now() - Duration::hours(2));
        assert_eq!(cache.get_fresh("maven", now(), Duration::hours(24)), Some("3.6.1"));
        assert_eq!(cache.get_fresh("maven", now(), Duration::hours(1)), None);
        assert_eq!(cache.get_fresh("ant", now(), Duration::hours(24)), None);
    }

    #[test]
    fn test_cache_persists_between_runs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("upstream.json");

        let mut cache = Cache::load(&path)?;
        cache.insert("maven".to_string(), "3.6.1".to_string(), now());
        cache.save(&path)?;

        let cache = Cache::load(&path)?;
        assert_eq!(cache.get_fresh("maven", now(), Duration::hours(1)), Some("3.6.1"));
        Ok(())
    }

    #[test]
    fn test_lookup_all() -> Result<()> {
        let monitoring = FakeMonitoring {
            versions: HashMap::from([
                ("maven".to_string(), "3.6.1".to_string()),
                ("xmvn".to_string(), String::new()),
            ]),
            ..Default::default()
        };
        let mut cache = Cache::default();
        cache.insert("junit".to_string(), "4.12".to_string(), now() - Duration::hours(1));
        let packages = ["junit", "maven", "xmvn", "broken"].map(String::from);

        let versions = lookup_all(&monitoring, &packages, &mut cache, &UpstreamConfig::default(), now())?;
        assert_eq!(
            versions,
            HashMap::from([
                ("junit".to_string(), "4.12".to_string()),
                ("maven".to_string(), "3.6.1".to_string()),
                ("xmvn".to_string(), String::new()),
                ("broken".to_string(), String::new()),
            ])
        );

        let mut asked = monitoring.asked.lock().unwrap().clone();
        asked.sort();
        assert_eq!(asked, vec!["broken", "maven", "xmvn"]);

        // failures are retried on the next run
        assert_eq!(cache.get_fresh("broken", now(), Duration::hours(1)), None);
        assert_eq!(cache.get_fresh("xmvn", now(), Duration::hours(1)), Some(""));
        Ok(())
    }
}
