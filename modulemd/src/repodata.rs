//! Download and parse the rpm-md metadata of a Koji repo.

use crate::sack::Package;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use javapkg_common::errors::*;
use javapkg_common::http;
use javapkg_common::rpm::{Cmp, Evr, Reldep};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use xz2::read::XzDecoder;

#[derive(Debug, PartialEq, Eq)]
pub enum CompressedWith {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Unknown,
}

impl CompressedWith {
    pub fn from_href(href: &str) -> Option<CompressedWith> {
        let (_, ext) = href.rsplit_once('.')?;
        match ext {
            "gz" => Some(CompressedWith::Gzip),
            "bz2" => Some(CompressedWith::Bzip2),
            "xz" => Some(CompressedWith::Xz),
            "zst" | "zstd" => Some(CompressedWith::Zstd),
            "xml" => Some(CompressedWith::Unknown),
            _ => None,
        }
    }

    pub fn sniff(bytes: &[u8]) -> CompressedWith {
        let mime = tree_magic_mini::from_u8(bytes);
        debug!("Detected mimetype for repodata: {:?}", mime);

        match mime {
            "application/gzip" => CompressedWith::Gzip,
            "application/x-bzip" | "application/x-bzip2" => CompressedWith::Bzip2,
            "application/x-xz" => CompressedWith::Xz,
            "application/zstd" => CompressedWith::Zstd,
            _ => CompressedWith::Unknown,
        }
    }

    pub fn decoder<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn Read + 'a>> {
        match self {
            CompressedWith::Gzip => Ok(Box::new(GzDecoder::new(bytes))),
            CompressedWith::Bzip2 => Ok(Box::new(BzDecoder::new(bytes))),
            CompressedWith::Xz => Ok(Box::new(XzDecoder::new(bytes))),
            CompressedWith::Zstd => Ok(Box::new(zstd::Decoder::new(bytes)?)),
            CompressedWith::Unknown => Ok(Box::new(bytes)),
        }
    }
}

fn open<'a>(href: &str, bytes: &'a [u8]) -> Result<Box<dyn Read + 'a>> {
    let comp = CompressedWith::from_href(href).unwrap_or_else(|| CompressedWith::sniff(bytes));
    comp.decoder(bytes)
}

/// Read `href` relative to the repo, from the cache directory if it was fetched before.
fn fetch_cached(client: &http::Client, base: &str, href: &str, cache: &Path) -> Result<Vec<u8>> {
    let filename = href.rsplit('/').next().unwrap_or(href);
    let cached = cache.join(filename);
    if let Ok(bytes) = fs::read(&cached) {
        debug!("Using cached {:?}", cached);
        return Ok(bytes);
    }

    let url = format!("{}{}", base, href);
    let bytes = if url.starts_with("https://") || url.starts_with("http://") {
        http::fetch(client, &url)?
    } else {
        info!("Reading {:?}...", url);
        fs::read(&url).with_context(|| format!("Failed to read {:?}", url))?
    };

    fs::create_dir_all(cache)
        .with_context(|| format!("Failed to create cache directory {:?}", cache))?;
    let tmp = cache.join(format!(".{}.tmp", filename));
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &cached)?;

    Ok(bytes)
}

/// Load all packages of the repo at `base` (ending with a slash).
pub fn load(client: &http::Client, base: &str, cache: &Path) -> Result<Vec<Package>> {
    let repomd = fetch_cached(client, base, "repodata/repomd.xml", cache)?;
    let primary_href = get_location_from_xml(&repomd, "primary")?;
    let filelists_href = get_location_from_xml(&repomd, "filelists")?;

    let bytes = fetch_cached(client, base, &primary_href, cache)?;
    info!("Parsing primary index ({} bytes)...", bytes.len());
    let primary = parse_primary(open(&primary_href, &bytes)?)?;

    let bytes = fetch_cached(client, base, &filelists_href, cache)?;
    info!("Parsing filelists ({} bytes)...", bytes.len());
    let filelists = parse_filelists(open(&filelists_href, &bytes)?)?;

    merge(primary, filelists)
}

#[derive(Debug, Deserialize)]
pub struct RepomdXml {
    #[serde(rename = "#content")]
    pub data: Vec<RepomdXmlItem>,
}

#[derive(Debug, Deserialize)]
pub struct RepomdXmlItem {
    #[serde(rename = "@type")]
    pub item_type: Option<String>,
    pub location: Option<RepomdXmlLocation>,
}

#[derive(Debug, Deserialize)]
pub struct RepomdXmlLocation {
    #[serde(rename = "@href")]
    pub href: String,
}

fn get_location_from_xml(bytes: &[u8], kind: &str) -> Result<String> {
    let list = serde_xml_rs::from_reader::<RepomdXml, _>(bytes)?;
    let item = list
        .data
        .into_iter()
        .find(|x| x.item_type.as_deref() == Some(kind))
        .with_context(|| format!("Failed to find {:?} in repomd file", kind))?;
    let location = item
        .location
        .context("Failed to find 'location' attribute")?;
    Ok(location.href)
}

#[derive(Debug, Deserialize)]
pub struct PrimaryXml {
    #[serde(rename = "#content", default)]
    pub packages: Vec<PrimaryXmlPackage>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct PrimaryXmlPackage {
    pub name: String,
    pub arch: String,
    pub version: XmlVersion,
    pub format: PrimaryXmlFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct XmlVersion {
    #[serde(rename = "@epoch")]
    pub epoch: Option<String>,
    #[serde(rename = "@ver")]
    pub ver: String,
    #[serde(rename = "@rel")]
    pub rel: Option<String>,
}

impl XmlVersion {
    fn to_evr(&self) -> Result<Evr> {
        let epoch = match self.epoch.as_deref() {
            None | Some("") => None,
            Some(epoch) => Some(
                epoch
                    .parse()
                    .with_context(|| format!("Invalid epoch: {:?}", epoch))?,
            ),
        };
        Ok(Evr::new(epoch, self.ver.clone(), self.rel.clone()))
    }
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct PrimaryXmlFormat {
    #[serde(rename = "rpm:sourcerpm", default)]
    pub sourcerpm: String,
    #[serde(rename = "rpm:provides")]
    pub provides: Option<RpmEntries>,
    #[serde(rename = "rpm:requires")]
    pub requires: Option<RpmEntries>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct RpmEntries {
    #[serde(rename = "rpm:entry", default)]
    pub entries: Vec<RpmEntry>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct RpmEntry {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@flags")]
    pub flags: Option<String>,
    #[serde(rename = "@epoch")]
    pub epoch: Option<String>,
    #[serde(rename = "@ver")]
    pub ver: Option<String>,
    #[serde(rename = "@rel")]
    pub rel: Option<String>,
}

impl RpmEntry {
    fn to_reldep(&self) -> Result<Reldep> {
        let (Some(flags), Some(ver)) = (&self.flags, &self.ver) else {
            return Ok(Reldep::unversioned(self.name.clone()));
        };
        let version = XmlVersion {
            epoch: self.epoch.clone(),
            ver: ver.clone(),
            rel: self.rel.clone(),
        };
        Ok(Reldep::versioned(
            self.name.clone(),
            Cmp::from_repodata(flags)?,
            version.to_evr()?,
        ))
    }
}

fn to_reldeps(entries: &Option<RpmEntries>) -> Result<Vec<Reldep>> {
    entries
        .iter()
        .flat_map(|e| &e.entries)
        .map(RpmEntry::to_reldep)
        .collect()
}

fn count_package_tags(buf: &[u8]) -> usize {
    buf.windows(9).filter(|w| *w == &b"<package "[..]).count()
}

/// An index that lists packages but deserializes to nothing means the xml layout wasn't understood.
fn ensure_parsed(buf: &[u8], parsed: usize) -> Result<()> {
    if parsed == 0 {
        let listed = count_package_tags(buf);
        if listed > 0 {
            bail!("Primary index lists {} packages, but none could be parsed", listed);
        }
    }
    Ok(())
}

fn parse_primary<R: Read>(mut r: R) -> Result<Vec<PrimaryXmlPackage>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)
        .context("Failed to read primary index")?;
    let list = serde_xml_rs::from_reader::<PrimaryXml, _>(&buf[..])
        .context("Failed to parse primary index")?;
    ensure_parsed(&buf, list.packages.len())?;
    Ok(list.packages)
}

#[derive(Debug, Deserialize)]
pub struct FilelistsXml {
    #[serde(rename = "#content", default)]
    pub packages: Vec<FilelistsXmlPackage>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct FilelistsXmlPackage {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@arch")]
    pub arch: String,
    pub version: XmlVersion,
    #[serde(rename = "file", default)]
    pub files: Vec<String>,
}

fn parse_filelists<R: Read>(r: R) -> Result<Vec<FilelistsXmlPackage>> {
    let list = serde_xml_rs::from_reader::<FilelistsXml, _>(r)
        .context("Failed to parse filelists")?;
    Ok(list.packages)
}

fn merge(primary: Vec<PrimaryXmlPackage>, filelists: Vec<FilelistsXmlPackage>) -> Result<Vec<Package>> {
    let mut files = filelists
        .into_iter()
        .map(|f| ((f.name, f.arch, f.version), f.files))
        .collect::<HashMap<_, _>>();

    let mut packages = Vec::with_capacity(primary.len());
    for pkg in primary {
        if pkg.arch == "src" {
            continue;
        }
        let key = (pkg.name, pkg.arch, pkg.version);
        let pkg_files = files.remove(&key).unwrap_or_default();
        let (name, arch, version) = key;
        packages.push(Package {
            evr: version.to_evr()?,
            provides: to_reldeps(&pkg.format.provides)?,
            requires: to_reldeps(&pkg.format.requires)?,
            sourcerpm: pkg.format.sourcerpm,
            files: pkg_files,
            name,
            arch,
        });
    }
    Ok(packages)
}
