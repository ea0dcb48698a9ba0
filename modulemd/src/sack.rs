use javapkg_common::errors::*;
use javapkg_common::rpm::{label_compare, Cmp, Evr, Reldep};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

pub type PkgId = usize;

/// A binary package of the repo.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub evr: Evr,
    pub arch: String,
    pub sourcerpm: String,
    pub provides: Vec<Reldep>,
    pub requires: Vec<Reldep>,
    pub files: Vec<String>,
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}

/// In-memory index of the packages of one repo.
#[derive(Debug, Default)]
pub struct Sack {
    packages: Vec<Package>,
    provides: HashMap<String, Vec<PkgId>>,
    files: HashMap<String, Vec<PkgId>>,
}

impl Sack {
    pub fn new(packages: Vec<Package>) -> Sack {
        let mut sack = Sack::default();

        for mut pkg in packages {
            if pkg.arch == "src" {
                continue;
            }

            // every package implicitly provides its own name
            if !pkg.provides.iter().any(|p| p.name == pkg.name) {
                pkg.provides
                    .push(Reldep::versioned(pkg.name.clone(), Cmp::Eq, pkg.evr.clone()));
            }

            let id = sack.packages.len();
            for provide in &pkg.provides {
                let ids = sack.provides.entry(provide.name.clone()).or_default();
                if ids.last() != Some(&id) {
                    ids.push(id);
                }
            }
            for file in &pkg.files {
                sack.files.entry(file.clone()).or_default().push(id);
            }
            sack.packages.push(pkg);
        }

        debug!(
            "Loaded sack with {} packages, {} provides and {} files",
            sack.packages.len(),
            sack.provides.len(),
            sack.files.len()
        );
        sack
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, id: PkgId) -> &Package {
        &self.packages[id]
    }

    /// All packages satisfying `dep`, through their provides or their file list.
    pub fn whatprovides(&self, dep: &Reldep) -> Vec<PkgId> {
        let mut ids = self
            .provides
            .get(&dep.name)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        self.packages[*id]
                            .provides
                            .iter()
                            .any(|p| dep.satisfied_by(p))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if dep.is_file() && dep.version.is_none() {
            if let Some(owners) = self.files.get(&dep.name) {
                ids.extend(owners);
            }
        }

        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Order two packages by preference: higher EVR first, then by name.
    pub fn compare(&self, a: PkgId, b: PkgId) -> Ordering {
        let (pa, pb) = (&self.packages[a], &self.packages[b]);
        label_compare(&pb.evr, &pa.evr)
            .then_with(|| pa.name.cmp(&pb.name))
            .then_with(|| a.cmp(&b))
    }

    /// Keep only the newest package of every name.
    pub fn latest_per_name(&self, ids: &[PkgId]) -> Vec<PkgId> {
        let mut best: HashMap<&str, PkgId> = HashMap::new();
        for id in ids {
            let name = self.packages[*id].name.as_str();
            match best.get(name) {
                Some(other) if self.compare(*other, *id) != Ordering::Greater => (),
                _ => {
                    best.insert(name, *id);
                }
            }
        }
        let mut ids = best.into_values().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Build a package for tests, `requires` and `provides` use the `name OP evr` syntax.
    pub fn pkg(
        name: &str,
        evr: &str,
        srpm: &str,
        requires: &[&str],
        provides: &[&str],
        files: &[&str],
    ) -> Package {
        Package {
            name: name.to_string(),
            evr: evr.parse().unwrap(),
            arch: "noarch".to_string(),
            sourcerpm: srpm.to_string(),
            provides: provides.iter().map(|p| p.parse().unwrap()).collect(),
            requires: requires.iter().map(|r| r.parse().unwrap()).collect(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn sample() -> Sack {
        Sack::new(vec![
            pkg("junit", "4.12-9.fc29", "junit-4.12-9.fc29.src.rpm", &["hamcrest"], &["mvn(junit:junit) = 4.12"], &["/usr/share/java/junit.jar"]),
            pkg("junit", "4.11-1.fc28", "junit-4.11-1.fc28.src.rpm", &[], &["mvn(junit:junit) = 4.11"], &[]),
            pkg("hamcrest", "1.3-23.fc29", "hamcrest-1.3-23.fc29.src.rpm", &[], &[], &["/usr/share/java/hamcrest/core.jar"]),
        ])
    }

    #[test]
    fn test_skips_source_packages() {
        let mut src = pkg("junit", "4.12-9.fc29", "", &[], &[], &[]);
        src.arch = "src".to_string();
        let sack = Sack::new(vec![src]);
        assert!(sack.is_empty());
    }

    #[test]
    fn test_implicit_name_provide() {
        let sack = sample();
        assert_eq!(sack.whatprovides(&"hamcrest".parse().unwrap()), vec![2]);
        assert_eq!(sack.whatprovides(&"hamcrest >= 1.3".parse().unwrap()), vec![2]);
        assert!(sack.whatprovides(&"hamcrest > 1.3".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_whatprovides_versioned() {
        let sack = sample();
        assert_eq!(sack.whatprovides(&"mvn(junit:junit)".parse().unwrap()), vec![0, 1]);
        assert_eq!(sack.whatprovides(&"mvn(junit:junit) >= 4.12".parse().unwrap()), vec![0]);
        assert!(sack.whatprovides(&"mvn(org.junit:junit)".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_whatprovides_file() {
        let sack = sample();
        assert_eq!(sack.whatprovides(&Reldep::unversioned("/usr/share/java/junit.jar")), vec![0]);
        assert!(sack.whatprovides(&Reldep::unversioned("/usr/bin/mvn")).is_empty());
    }

    #[test]
    fn test_latest_per_name() {
        let sack = sample();
        assert_eq!(sack.latest_per_name(&[1, 0, 2]), vec![0, 2]);
    }
}
