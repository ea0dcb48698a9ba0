use javapkg_common::config::DEFAULT_KOJI_INSTANCE;
use javapkg_common::errors::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_UPSTREAM_URL: &str = "https://release-monitoring.org";
pub const DEFAULT_DISTRIBUTION: &str = "Fedora";
pub const DEFAULT_CACHE_TTL: u64 = 24;
pub const DEFAULT_THREADS: usize = 30;

#[derive(Debug, Deserialize)]
pub struct Profile {
    /// Where the list of packages comes from
    pub packages: KojiTag,
    #[serde(default)]
    pub releases: Vec<Release>,
    pub reference: Release,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub exceptions: Option<PathBuf>,
    pub comments: Option<PathBuf>,
    #[serde(default = "default_stylesheet")]
    pub stylesheet: String,
}

impl Profile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Profile> {
        let buf = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read profile {:?}", path.as_ref()))?;
        let profile = toml::from_str(&buf).context("Failed to load profile")?;
        Ok(profile)
    }

    /// All Koji instances the profile talks to.
    pub fn instances(&self) -> Vec<&str> {
        let mut instances = vec![self.packages.instance.as_str(), self.reference.tag.instance.as_str()];
        instances.extend(self.releases.iter().map(|r| r.tag.instance.as_str()));
        instances.sort_unstable();
        instances.dedup();
        instances
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KojiTag {
    #[serde(default = "default_instance")]
    pub instance: String,
    pub tag: String,
}

/// A column of the report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(flatten)]
    pub tag: KojiTag,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_distribution")]
    pub distribution: String,
    pub cache: Option<PathBuf>,
    /// hours
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for UpstreamConfig {
    fn default() -> UpstreamConfig {
        UpstreamConfig {
            url: default_upstream_url(),
            distribution: default_distribution(),
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            threads: DEFAULT_THREADS,
        }
    }
}

fn default_instance() -> String {
    DEFAULT_KOJI_INSTANCE.to_string()
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_distribution() -> String {
    DEFAULT_DISTRIBUTION.to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_stylesheet() -> String {
    "mystyle.css".to_string()
}
