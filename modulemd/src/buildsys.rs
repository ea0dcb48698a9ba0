use javapkg_common::errors::*;
use javapkg_common::koji::KojiSession;
use javapkg_common::rpm::Nvra;
use std::collections::{BTreeSet, HashMap};

/// Everything the closure needs to know about builds, keyed by SRPM filename.
pub trait BuildSystem {
    /// Build requirements of every SRPM, in the same order.
    fn build_requires(&self, srpms: &[String]) -> Result<Vec<Vec<String>>>;

    /// Names of all binary rpms built from the SRPMs.
    fn binary_rpms(&self, srpms: &[String]) -> Result<BTreeSet<String>>;

    /// Short commit hash every SRPM was built from, where it can be found.
    /// Commit every SRPM was built from, `None` where it can't be determined.
    fn git_refs(&self, srpms: &[String]) -> Result<HashMap<String, Option<String>>>;
}

pub struct KojiBuildSystem<'a> {
    session: &'a KojiSession,
    arch: String,
}

impl<'a> KojiBuildSystem<'a> {
    pub fn new<I: Into<String>>(session: &'a KojiSession, arch: I) -> KojiBuildSystem<'a> {
        KojiBuildSystem {
            session,
            arch: arch.into(),
        }
    }

    fn nvrs(srpms: &[String]) -> Result<Vec<String>> {
        srpms
            .iter()
            .map(|srpm| -> Result<String> { Ok(Nvra::parse(srpm)?.nvr()) })
            .collect()
    }

    fn checkout_ref(&self, task_id: i64) -> Result<Option<String>> {
        let log = self.session.download_task_output(task_id, "checkout.log")?;
        Ok(parse_checkout_ref(&String::from_utf8_lossy(&log)))
    }
}

impl BuildSystem for KojiBuildSystem<'_> {
    fn build_requires(&self, srpms: &[String]) -> Result<Vec<Vec<String>>> {
        info!("Getting build-requires from Koji...");
        let nvras = srpms
            .iter()
            .map(|srpm| Nvra::parse(srpm))
            .collect::<Result<Vec<_>>>()?;
        self.session.get_rpm_requires(&nvras)
    }

    fn binary_rpms(&self, srpms: &[String]) -> Result<BTreeSet<String>> {
        let builds = self.session.get_builds(&Self::nvrs(srpms)?)?;
        let ids = builds.iter().map(|b| b.id).collect::<Vec<_>>();
        let rpms = self
            .session
            .list_rpms(&ids, &["noarch", self.arch.as_str()])?;

        Ok(rpms
            .into_iter()
            .flatten()
            .filter(|name| !name.ends_with("-debuginfo") && !name.ends_with("-debugsource"))
            .collect())
    }

    fn git_refs(&self, srpms: &[String]) -> Result<HashMap<String, Option<String>>> {
        let mut refs = srpms
            .iter()
            .map(|srpm| (srpm.clone(), None))
            .collect::<HashMap<_, _>>();
        if srpms.is_empty() {
            return Ok(refs);
        }

        let builds = self.session.get_builds(&Self::nvrs(srpms)?)?;
        let (srpms, task_ids): (Vec<_>, Vec<_>) = srpms
            .iter()
            .zip(&builds)
            .filter_map(|(srpm, build)| match build.task_id {
                Some(task_id) => Some((srpm, task_id)),
                None => {
                    warn!("Build {} has no task, can't resolve its git ref", build.nvr);
                    None
                }
            })
            .unzip();

        let children = self.session.get_task_children(&task_ids)?;
        for (srpm, tasks) in srpms.into_iter().zip(children) {
            let Some(task) = tasks.iter().find(|t| t.label.as_deref() == Some("srpm")) else {
                warn!("No srpm task found for {}", srpm);
                continue;
            };
            match self.checkout_ref(task.id)? {
                Some(r) => {
                    debug!("Resolved {} to {}", srpm, r);
                    refs.insert(srpm.clone(), Some(r));
                }
                None => warn!("No checkout found in log of task {}", task.id),
            }
        }
        Ok(refs)
    }
}

/// Extract the abbreviated commit from a `checkout.log` of a Koji srpm task.
pub fn parse_checkout_ref(log: &str) -> Option<String> {
    log.lines()
        .find(|line| line.starts_with("HEAD is now at"))
        .and_then(|line| line.get(15..22))
        .map(String::from)
}
