use crate::buildsys::BuildSystem;
use crate::config::Profile;
use crate::depsolve::Depsolve;
use crate::sack::{Package, PkgId, Sack};
use javapkg_common::errors::*;
use javapkg_common::rpm::name_of;
use std::collections::{BTreeMap, BTreeSet};
use std::slice;

const JAVA_PATHS: &[&str] = &[
    "/usr/share/maven-metadata/",
    "/usr/share/java/",
    "/usr/lib/java/",
];

/// Result of the iterative closure.
#[derive(Debug, Default, PartialEq)]
pub struct Closure {
    /// SRPMs that are components of the module
    pub srpms: BTreeSet<String>,
    /// Every package pulled in while resolving, in the module or not
    pub installed: BTreeSet<PkgId>,
    /// build requirement -> SRPMs that have it
    pub br_map: BTreeMap<String, BTreeSet<String>>,
}

/// Guess if a package belongs to the module, explicit includes and excludes win over the heuristic.
pub fn is_maven_pkg(profile: &Profile, pkg: &Package) -> bool {
    let srpm = name_of(&pkg.sourcerpm);
    if profile.includes.contains(srpm) {
        return true;
    }
    if profile.excludes.contains(srpm) {
        return false;
    }
    pkg.files
        .iter()
        .any(|file| JAVA_PATHS.iter().any(|prefix| file.starts_with(prefix)))
}

/// Simulate installing `deps`, falling back to one dependency at a time if they don't resolve together.
///
/// Returns the SRPMs of installed packages that belong to the module, and all installed packages.
pub fn resolve_deps<D: Depsolve>(
    sack: &Sack,
    solver: &D,
    profile: &Profile,
    deps: &[String],
) -> (BTreeSet<String>, BTreeSet<PkgId>) {
    info!("Resolving deps...");
    let goal = solver.run_goal(deps);

    let installs = if goal.resolved {
        goal.installs
    } else {
        let mut installs = BTreeSet::new();
        for dep in deps {
            let goal = solver.run_goal(slice::from_ref(dep));
            if goal.resolved {
                installs.extend(goal.installs);
            } else {
                warn!("Dependency problems for {}:\n{}", dep, goal.problems.join("\n"));
            }
        }
        installs
    };

    let java = installs
        .iter()
        .map(|id| sack.get(*id))
        .filter(|pkg| is_maven_pkg(profile, pkg))
        .map(|pkg| pkg.sourcerpm.clone())
        .collect();
    (java, installs)
}

pub fn compute<D: Depsolve, B: BuildSystem>(
    sack: &Sack,
    solver: &D,
    buildsys: &B,
    profile: &Profile,
) -> Result<Closure> {
    let mut closure = Closure::default();

    let api = profile.api.iter().cloned().collect::<Vec<_>>();
    let (mut todo, installed) = resolve_deps(sack, solver, profile, &api);
    closure.installed = installed;

    while !todo.is_empty() {
        info!("Round: {} packages", todo.len());
        todo.retain(|srpm| !profile.excludes.contains(name_of(srpm)));
        if todo.is_empty() {
            break;
        }
        closure.srpms.extend(todo.iter().cloned());

        let round = todo.into_iter().collect::<Vec<_>>();
        let mut combined = BTreeSet::new();
        if profile.include_build_deps {
            let requires = buildsys.build_requires(&round)?;
            for (srpm, brs) in round.iter().zip(requires) {
                for br in brs {
                    closure
                        .br_map
                        .entry(br.clone())
                        .or_default()
                        .insert(srpm.clone());
                    combined.insert(br);
                }
            }
        }
        if profile.closure {
            combined.extend(buildsys.binary_rpms(&round)?);
        }

        let deps = combined.into_iter().collect::<Vec<_>>();
        let (java, installed) = resolve_deps(sack, solver, profile, &deps);
        closure.installed.extend(installed);
        todo = java
            .into_iter()
            .filter(|srpm| !closure.srpms.contains(srpm))
            .collect();
    }

    debug!(
        "Closure has {} components and {} installed packages",
        closure.srpms.len(),
        closure.installed.len()
    );
    Ok(closure)
}
