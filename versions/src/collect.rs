use crate::config::{KojiTag, Profile};
use crate::upstream::{self, Cache, Monitoring};
use chrono::{DateTime, Utc};
use javapkg_common::config::ConfigFile;
use javapkg_common::errors::*;
use javapkg_common::http;
use javapkg_common::koji::KojiSession;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Queries against the tags of one or more Koji instances.
pub trait KojiTags: Sync {
    fn packages(&self, tag: &KojiTag) -> Result<Vec<String>>;

    /// Version of the latest build of every package tagged into `tag`.
    fn latest(&self, tag: &KojiTag) -> Result<HashMap<String, String>>;
}

pub struct KojiInstances {
    sessions: HashMap<String, KojiSession>,
}

impl KojiInstances {
    pub fn new(client: &http::Client, config: &ConfigFile, instances: &[&str]) -> Result<KojiInstances> {
        let mut sessions = HashMap::new();
        for name in instances {
            let instance = config.koji_instance(name)?;
            debug!("Using koji instance {:?} at {:?}", name, instance.hub);
            sessions.insert(name.to_string(), KojiSession::new(client.clone(), instance.hub));
        }
        Ok(KojiInstances { sessions })
    }

    fn session(&self, tag: &KojiTag) -> Result<&KojiSession> {
        self.sessions
            .get(&tag.instance)
            .with_context(|| format!("Koji instance is not configured: {:?}", tag.instance))
    }
}

impl KojiTags for KojiInstances {
    fn packages(&self, tag: &KojiTag) -> Result<Vec<String>> {
        self.session(tag)?.list_packages(&tag.tag)
    }

    fn latest(&self, tag: &KojiTag) -> Result<HashMap<String, String>> {
        info!("Listing latest builds in {}/{}...", tag.instance, tag.tag);
        self.session(tag)?.list_tagged_latest(&tag.tag)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// one version per release, empty where the package isn't tagged
    pub releases: Vec<String>,
    pub reference: String,
    pub upstream: String,
}

#[derive(Debug, PartialEq)]
pub struct Matrix {
    pub releases: Vec<String>,
    pub reference: String,
    pub rows: BTreeMap<String, Row>,
}

fn version_of(versions: &HashMap<String, String>, package: &str) -> String {
    versions.get(package).cloned().unwrap_or_default()
}

pub fn collect<K: KojiTags, M: Monitoring>(
    koji: &K,
    monitoring: &M,
    profile: &Profile,
    cache: &mut Cache,
    now: DateTime<Utc>,
) -> Result<Matrix> {
    info!("Listing packages in {}/{}...", profile.packages.instance, profile.packages.tag);
    let packages = koji.packages(&profile.packages)?;
    info!("Found {} packages", packages.len());

    let upstream = upstream::lookup_all(monitoring, &packages, cache, &profile.upstream, now)?;
    let reference = koji.latest(&profile.reference.tag)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(profile.releases.len().max(1))
        .build()?;
    let releases = pool.install(|| {
        profile
            .releases
            .par_iter()
            .map(|release| {
                koji.latest(&release.tag)
                    .with_context(|| format!("Failed to list builds of release {:?}", release.name))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let rows = packages
        .into_iter()
        .map(|package| {
            let row = Row {
                releases: releases.iter().map(|r| version_of(r, &package)).collect(),
                reference: version_of(&reference, &package),
                upstream: version_of(&upstream, &package),
            };
            (package, row)
        })
        .collect();

    Ok(Matrix {
        releases: profile.releases.iter().map(|r| r.name.clone()).collect(),
        reference: profile.reference.name.clone(),
        rows,
    })
}
