use javapkg_common::config::DEFAULT_KOJI_INSTANCE;
use javapkg_common::errors::*;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

/// Definition of a module, read from `modulemd.toml` in the module's git checkout.
#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    pub summary: String,
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default = "default_license")]
    pub license: Vec<String>,
    pub api: BTreeSet<String>,
    /// Installation profiles, in the order they are defined
    #[serde(default, deserialize_with = "deserialize_ordered")]
    pub profiles: Vec<(String, BTreeSet<String>)>,

    /// Source packages always considered part of the module
    #[serde(default)]
    pub includes: HashSet<String>,
    /// Source packages never considered part of the module
    #[serde(default)]
    pub excludes: HashSet<String>,
    #[serde(default)]
    pub filter: BTreeSet<String>,
    #[serde(default)]
    pub filter_unused: bool,
    /// Pull all binary packages of module components into the closure
    #[serde(default)]
    pub closure: bool,
    #[serde(default = "default_true")]
    pub include_build_deps: bool,

    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub buildrequires: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    /// dependency -> (our stream -> their stream)
    #[serde(default)]
    pub stream_override: HashMap<String, HashMap<String, String>>,
    #[serde(default, deserialize_with = "deserialize_ordered")]
    pub macros: Vec<(String, String)>,

    #[serde(default)]
    pub full_refs: bool,
    pub default_ref: Option<String>,
    #[serde(default)]
    pub frozen_refs: HashSet<String>,
    #[serde(default)]
    pub buildorder: bool,

    pub koji: KojiProfile,
}

/// Read a table as a list of entries, keeping them in the order of the file.
fn deserialize_ordered<'de, D, V>(deserializer: D) -> std::result::Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a table")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::new();
            while let Some(entry) = map.next_entry::<String, V>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

fn default_license() -> Vec<String> {
    vec!["MIT".to_string()]
}

fn default_true() -> bool {
    true
}

impl Profile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Profile> {
        let buf = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read module definition {:?}", path.as_ref()))?;
        let profile = toml::from_str(&buf)
            .context("Failed to load module definition")?;
        Ok(profile)
    }

    /// Stream of a module dependency, `stream` unless overridden.
    pub fn stream_for<'a>(&'a self, dep: &str, stream: &'a str) -> &'a str {
        self.stream_override
            .get(dep)
            .and_then(|o| o.get(stream))
            .map(String::as_str)
            .unwrap_or(stream)
    }
}

#[derive(Debug, Deserialize)]
pub struct KojiProfile {
    #[serde(default = "default_instance")]
    pub instance: String,
    pub tag: String,
    #[serde(default = "default_arch")]
    pub arch: String,
}

impl Default for KojiProfile {
    fn default() -> KojiProfile {
        KojiProfile {
            instance: default_instance(),
            tag: String::new(),
            arch: default_arch(),
        }
    }
}

fn default_instance() -> String {
    DEFAULT_KOJI_INSTANCE.to_string()
}

fn default_arch() -> String {
    "x86_64".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() -> Result<()> {
        let profile: Profile = toml::from_str(
            r#"
summary = "Java project management and project comprehension tool"
description = ["Maven is a software project management and comprehension tool."]
api = ["maven", "maven-openjdk11"]
excludes = ["java-11-openjdk"]
requires = ["platform"]
buildrequires = ["platform", "javapackages-tools"]
frozen_refs = ["maven"]
default_ref = "master"

[profiles]
default = ["maven"]

[stream_override.platform]
"3.5" = "f29"

[macros]
_with_xmvn_javadoc = "1"

[koji]
tag = "module-maven-3.5-build"
"#,
        )?;

        assert_eq!(profile.license, vec!["MIT".to_string()]);
        assert!(profile.include_build_deps);
        assert!(!profile.closure);
        assert_eq!(profile.koji.instance, "fedora");
        assert_eq!(profile.koji.arch, "x86_64");
        assert_eq!(profile.stream_for("platform", "3.5"), "f29");
        assert_eq!(profile.stream_for("javapackages-tools", "3.5"), "3.5");
        assert_eq!(profile.default_ref.as_deref(), Some("master"));
        Ok(())
    }

    #[test]
    fn test_tables_keep_file_order() -> Result<()> {
        let profile: Profile = toml::from_str(
            r#"
summary = "x"
api = ["maven"]

[profiles]
default = ["maven", "maven-lib"]
bootstrap = ["maven-lib"]

[macros]
_without_asciidoc = "1"
_with_xmvn_javadoc = "1"
bootstrap = "1"

[koji]
tag = "f29"
"#,
        )?;

        let profiles = profile.profiles.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        assert_eq!(profiles, vec!["default", "bootstrap"]);
        assert_eq!(
            profile.macros,
            vec![
                ("_without_asciidoc".to_string(), "1".to_string()),
                ("_with_xmvn_javadoc".to_string(), "1".to_string()),
                ("bootstrap".to_string(), "1".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_api_is_required() {
        let r = toml::from_str::<Profile>("summary = \"x\"\n[koji]\ntag = \"f29\"\n");
        assert!(r.is_err());
    }
}
