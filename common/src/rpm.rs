//! RPM naming and version semantics.
//!
//! This covers what the tools need from librpm: splitting package file names,
//! `rpmvercmp` ordering and matching of versioned dependencies against
//! versioned provides.

use crate::errors::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static NVRA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)-([^-]+)-([^-]+)\.([^-.]+)\.rpm$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nvra {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nvra {
    /// Split a file name like `maven-3.5.4-5.fc29.src.rpm`.
    pub fn parse(filename: &str) -> Result<Nvra> {
        let caps = NVRA_RE
            .captures(filename)
            .ok_or_else(|| format_err!("Not an rpm file name: {:?}", filename))?;
        Ok(Nvra {
            name: caps[1].to_string(),
            version: caps[2].to_string(),
            release: caps[3].to_string(),
            arch: caps[4].to_string(),
        })
    }

    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }
}

/// Package name of an rpm file name, the file name itself if it can't be parsed.
pub fn name_of(filename: &str) -> &str {
    NVRA_RE
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map_or(filename, |m| m.as_str())
}

pub fn strip_src_rpm(filename: &str) -> &str {
    filename.strip_suffix(".src.rpm").unwrap_or(filename)
}

fn is_separator(c: u8) -> bool {
    !c.is_ascii_alphanumeric() && c != b'~' && c != b'^'
}

/// Compare two version (or release) strings the way `rpmvercmp` does.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < one.len() || j < two.len() {
        while i < one.len() && is_separator(one[i]) {
            i += 1;
        }
        while j < two.len() && is_separator(two[j]) {
            j += 1;
        }

        let c1 = one.get(i).copied();
        let c2 = two.get(j).copied();

        // tilde sorts before everything, even the end of the string
        if c1 == Some(b'~') || c2 == Some(b'~') {
            if c1 != Some(b'~') {
                return Ordering::Greater;
            }
            if c2 != Some(b'~') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        // caret sorts after the end of the string, but before anything else
        if c1 == Some(b'^') || c2 == Some(b'^') {
            if c1.is_none() {
                return Ordering::Less;
            }
            if c2.is_none() {
                return Ordering::Greater;
            }
            if c1 != Some(b'^') {
                return Ordering::Greater;
            }
            if c2 != Some(b'^') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        let (Some(c1), Some(_)) = (c1, c2) else {
            break;
        };

        let numeric = c1.is_ascii_digit();
        let segment = |s: &[u8], start: usize| -> usize {
            let mut end = start;
            while end < s.len()
                && (if numeric {
                    s[end].is_ascii_digit()
                } else {
                    s[end].is_ascii_alphabetic()
                })
            {
                end += 1;
            }
            end
        };
        let end1 = segment(one, i);
        let end2 = segment(two, j);

        if j == end2 {
            // numeric segments are newer than alpha segments
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let mut seg1 = &one[i..end1];
        let mut seg2 = &two[j..end2];
        if numeric {
            while seg1.first() == Some(&b'0') {
                seg1 = &seg1[1..];
            }
            while seg2.first() == Some(&b'0') {
                seg2 = &seg2[1..];
            }
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => (),
                other => return other,
            }
        }

        match seg1.cmp(seg2) {
            Ordering::Equal => (),
            other => return other,
        }

        i = end1;
        j = end2;
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Epoch, version and release of a package or dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: Option<u64>,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    pub fn new<V: Into<String>>(epoch: Option<u64>, version: V, release: Option<String>) -> Evr {
        Evr {
            epoch,
            version: version.into(),
            release: release.filter(|r| !r.is_empty()),
        }
    }
}

impl FromStr for Evr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Evr> {
        let (epoch, rest) = match s.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse()
                    .with_context(|| format!("Invalid epoch in {:?}", s))?;
                (Some(epoch), rest)
            }
            None => (None, s),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((version, release)) => (version, Some(release.to_string())),
            None => (rest, None),
        };
        if version.is_empty() {
            bail!("Empty version in {:?}", s);
        }
        Ok(Evr::new(epoch, version, release))
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(release) = &self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

/// Same as rpm's `labelCompare`, a missing release on either side matches any release.
pub fn label_compare(a: &Evr, b: &Evr) -> Ordering {
    let epoch = a.epoch.unwrap_or(0).cmp(&b.epoch.unwrap_or(0));
    if epoch != Ordering::Equal {
        return epoch;
    }
    let version = vercmp(&a.version, &b.version);
    if version != Ordering::Equal {
        return version;
    }
    match (&a.release, &b.release) {
        (Some(r1), Some(r2)) => vercmp(r1, r2),
        _ => Ordering::Equal,
    }
}

pub const RPMSENSE_LESS: u32 = 1 << 1;
pub const RPMSENSE_GREATER: u32 = 1 << 2;
pub const RPMSENSE_EQUAL: u32 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cmp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Cmp {
    pub fn from_sense(flags: u32) -> Option<Cmp> {
        let less = flags & RPMSENSE_LESS != 0;
        let greater = flags & RPMSENSE_GREATER != 0;
        let equal = flags & RPMSENSE_EQUAL != 0;
        match (less, equal, greater) {
            (true, true, _) => Some(Cmp::Le),
            (true, false, _) => Some(Cmp::Lt),
            (false, true, true) => Some(Cmp::Ge),
            (false, false, true) => Some(Cmp::Gt),
            (false, true, false) => Some(Cmp::Eq),
            (false, false, false) => None,
        }
    }

    /// Flags as used in repodata `rpm:entry` elements.
    pub fn from_repodata(flags: &str) -> Result<Cmp> {
        match flags {
            "LT" => Ok(Cmp::Lt),
            "LE" => Ok(Cmp::Le),
            "EQ" => Ok(Cmp::Eq),
            "GE" => Ok(Cmp::Ge),
            "GT" => Ok(Cmp::Gt),
            _ => bail!("Unknown dependency flags: {:?}", flags),
        }
    }

    fn less(self) -> bool {
        matches!(self, Cmp::Lt | Cmp::Le)
    }

    fn greater(self) -> bool {
        matches!(self, Cmp::Gt | Cmp::Ge)
    }

    fn equal(self) -> bool {
        matches!(self, Cmp::Le | Cmp::Eq | Cmp::Ge)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Eq => "=",
            Cmp::Ge => ">=",
            Cmp::Gt => ">",
        }
    }
}

impl FromStr for Cmp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Cmp> {
        match s {
            "<" => Ok(Cmp::Lt),
            "<=" | "=<" => Ok(Cmp::Le),
            "=" | "==" => Ok(Cmp::Eq),
            ">=" | "=>" => Ok(Cmp::Ge),
            ">" => Ok(Cmp::Gt),
            _ => bail!("Unknown comparison operator: {:?}", s),
        }
    }
}

/// A dependency or provide, optionally versioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reldep {
    pub name: String,
    pub version: Option<(Cmp, Evr)>,
}

impl Reldep {
    pub fn unversioned<I: Into<String>>(name: I) -> Reldep {
        Reldep {
            name: name.into(),
            version: None,
        }
    }

    pub fn versioned<I: Into<String>>(name: I, cmp: Cmp, evr: Evr) -> Reldep {
        Reldep {
            name: name.into(),
            version: Some((cmp, evr)),
        }
    }

    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Requirements on rpm itself that are never provided by packages.
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with("rpmlib(")
    }

    /// Check whether `provide` satisfies this requirement (rpm range overlap).
    pub fn satisfied_by(&self, provide: &Reldep) -> bool {
        if self.name != provide.name {
            return false;
        }
        let (Some((req_cmp, req_evr)), Some((prov_cmp, prov_evr))) =
            (&self.version, &provide.version)
        else {
            return true;
        };

        match label_compare(prov_evr, req_evr) {
            Ordering::Less => prov_cmp.greater() || req_cmp.less(),
            Ordering::Greater => prov_cmp.less() || req_cmp.greater(),
            Ordering::Equal => {
                (prov_cmp.equal() && req_cmp.equal())
                    || (prov_cmp.less() && req_cmp.less())
                    || (prov_cmp.greater() && req_cmp.greater())
            }
        }
    }
}

impl FromStr for Reldep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Reldep> {
        let mut parts = s.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| format_err!("Empty dependency"))?;
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Ok(Reldep::unversioned(name)),
            (Some(cmp), Some(evr), None) => Ok(Reldep::versioned(name, cmp.parse()?, evr.parse()?)),
            _ => bail!("Unsupported dependency: {:?}", s),
        }
    }
}

impl fmt::Display for Reldep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((cmp, evr)) = &self.version {
            write!(f, " {} {}", cmp.as_str(), evr)?;
        }
        Ok(())
    }
}
