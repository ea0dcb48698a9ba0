use crate::errors::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_HTTP_TIMEOUT: u64 = 60;
pub const DEFAULT_KOJI_INSTANCE: &str = "fedora";
pub const FEDORA_KOJI_HUB: &str = "https://koji.fedoraproject.org/kojihub";
pub const FEDORA_KOJI_TOPURL: &str = "https://kojipkgs.fedoraproject.org";
pub const DEFAULT_CACHE_DIR: &str = "/tmp/maven-modulemd-gen";

pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();

    if let Some(c) = load_from("/etc/javapkg-tools.conf")? {
        config.update(c);
    }

    if let Ok(path) = config_path() {
        if let Some(c) = load_from(path)? {
            config.update(c);
        }
    }

    if let Some(path) = path {
        let c = load_from(path)?
            .ok_or_else(|| format_err!("Failed to read config file"))?;
        config.update(c);
    }

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    let config_dir = dirs_next::config_dir()
        .ok_or_else(|| format_err!("Failed to find config dir"))?;
    Ok(config_dir.join("javapkg-tools.conf"))
}

fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<ConfigFile>> {
    if let Ok(buf) = fs::read_to_string(path.as_ref()) {
        debug!("loading config file {:?}", path.as_ref());
        let config = toml::from_str(&buf)
            .with_context(|| format!("Failed to load config {:?}", path.as_ref()))?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub koji: HashMap<String, KojiInstance>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ConfigFile {
    pub fn update(&mut self, c: ConfigFile) {
        self.http.update(c.http);
        for (k, v) in c.koji {
            if let Some(o) = self.koji.get_mut(&k) {
                o.update(v);
            } else {
                self.koji.insert(k, v);
            }
        }
        self.cache.update(c.cache);
    }

    /// Look up a configured koji instance, `fedora` is always known.
    pub fn koji_instance(&self, name: &str) -> Result<KojiInstance> {
        if let Some(instance) = self.koji.get(name) {
            Ok(instance.clone())
        } else if name == DEFAULT_KOJI_INSTANCE {
            Ok(KojiInstance::fedora())
        } else {
            bail!("Koji instance is not configured: {:?}", name)
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout: Option<u64>,
    pub user_agent: Option<String>,
}

impl HttpConfig {
    pub fn update(&mut self, c: HttpConfig) {
        if c.timeout.is_some() {
            self.timeout = c.timeout;
        }
        if c.user_agent.is_some() {
            self.user_agent = c.user_agent;
        }
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KojiInstance {
    pub hub: String,
    pub topurl: Option<String>,
}

impl KojiInstance {
    pub fn fedora() -> KojiInstance {
        KojiInstance {
            hub: FEDORA_KOJI_HUB.to_string(),
            topurl: Some(FEDORA_KOJI_TOPURL.to_string()),
        }
    }

    pub fn update(&mut self, c: KojiInstance) {
        self.hub = c.hub;
        if c.topurl.is_some() {
            self.topurl = c.topurl;
        }
    }

    pub fn topurl(&self) -> Result<&str> {
        self.topurl
            .as_deref()
            .ok_or_else(|| format_err!("Koji instance {:?} has no topurl configured", self.hub))
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn update(&mut self, c: CacheConfig) {
        if c.dir.is_some() {
            self.dir = c.dir;
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_update_overrides_fields() -> Result<()> {
        let mut config: ConfigFile = toml::from_str(
            r#"
[http]
timeout = 10

[koji.mbi]
hub = "https://koji.kjnet.xyz/kojihub"
topurl = "https://koji.kjnet.xyz/kojifiles"
"#,
        )?;
        config.update(toml::from_str(
            r#"
[http]
user_agent = "javapkg-tools"

[koji.mbi]
hub = "https://koji.example.com/kojihub"
"#,
        )?);

        assert_eq!(config.http.timeout(), 10);
        assert_eq!(config.http.user_agent.as_deref(), Some("javapkg-tools"));
        assert_eq!(
            config.koji_instance("mbi")?,
            KojiInstance {
                hub: "https://koji.example.com/kojihub".to_string(),
                topurl: Some("https://koji.kjnet.xyz/kojifiles".to_string()),
            }
        );
        Ok(())
    }

    #[test]
    fn test_fedora_is_builtin() -> Result<()> {
        let config = ConfigFile::default();
        assert_eq!(config.koji_instance("fedora")?, KojiInstance::fedora());
        assert!(config.koji_instance("mbi").is_err());
        assert_eq!(config.cache.dir(), PathBuf::from(DEFAULT_CACHE_DIR));
        Ok(())
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let r = load(Some(dir.path().join("missing.conf")));
        assert!(r.is_err());
    }

    #[test]
    fn test_load_explicit_path() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "[cache]\ndir = \"/var/cache/javapkg\"")?;
        let config = load(Some(file.path()))?;
        assert_eq!(config.cache.dir(), PathBuf::from("/var/cache/javapkg"));
        Ok(())
    }
}
