use crate::sack::{PkgId, Sack};
use javapkg_common::errors::*;
use javapkg_common::rpm::Reldep;
use std::collections::{BTreeSet, VecDeque};

/// Outcome of simulating the installation of a set of dependencies.
#[derive(Debug, Default, PartialEq)]
pub struct Goal {
    pub resolved: bool,
    pub problems: Vec<String>,
    pub installs: BTreeSet<PkgId>,
}

pub trait Depsolve {
    fn run_goal(&self, deps: &[String]) -> Goal;

    /// Packages matching a build requirement, the newest of every name.
    fn builddep_matches(&self, br: &str) -> Result<Vec<PkgId>>;

    /// Every package providing `reldep`.
    fn reldep_matches(&self, reldep: &Reldep) -> Vec<PkgId>;
}

pub struct SackSolver<'a> {
    sack: &'a Sack,
}

fn is_ignored(dep: &Reldep) -> bool {
    dep.is_rpmlib() || dep.name.starts_with('(')
}

impl<'a> SackSolver<'a> {
    pub fn new(sack: &'a Sack) -> SackSolver<'a> {
        SackSolver { sack }
    }

    /// Pick the provider to install, a package named like the dependency wins.
    fn best_provider(&self, dep: &Reldep, providers: &[PkgId]) -> Option<PkgId> {
        providers.iter().copied().min_by(|a, b| {
            let a_named = self.sack.get(*a).name == dep.name;
            let b_named = self.sack.get(*b).name == dep.name;
            b_named
                .cmp(&a_named)
                .then_with(|| self.sack.compare(*a, *b))
        })
    }

    fn install(&self, goal: &mut Goal, queue: &mut VecDeque<PkgId>, dep: &Reldep, needed_by: Option<&str>) {
        let providers = self.sack.whatprovides(dep);
        if providers.iter().any(|id| goal.installs.contains(id)) {
            return;
        }
        match self.best_provider(dep, &providers) {
            Some(id) => {
                trace!("Installing {} for {}", self.sack.get(id), dep);
                goal.installs.insert(id);
                queue.push_back(id);
            }
            None => {
                let problem = match needed_by {
                    Some(pkg) => format!("nothing provides {} needed by {}", dep, pkg),
                    None => format!("package {} does not exist", dep),
                };
                goal.problems.push(problem);
            }
        }
    }
}

impl Depsolve for SackSolver<'_> {
    fn run_goal(&self, deps: &[String]) -> Goal {
        let mut goal = Goal::default();
        let mut queue = VecDeque::new();

        for dep in deps {
            if dep.starts_with('(') {
                debug!("Skipping rich dependency: {:?}", dep);
                continue;
            }
            match dep.parse::<Reldep>() {
                Ok(reldep) if is_ignored(&reldep) => (),
                Ok(reldep) => self.install(&mut goal, &mut queue, &reldep, None),
                Err(err) => goal.problems.push(format!("{:#}", err)),
            }
        }

        while let Some(id) = queue.pop_front() {
            let pkg = self.sack.get(id);
            let needed_by = pkg.to_string();
            for req in &pkg.requires {
                if !is_ignored(req) {
                    self.install(&mut goal, &mut queue, req, Some(&needed_by));
                }
            }
        }

        goal.resolved = goal.problems.is_empty();
        goal
    }

    fn builddep_matches(&self, br: &str) -> Result<Vec<PkgId>> {
        let reldep = if br.starts_with('/') {
            Reldep::unversioned(br)
        } else {
            br.parse()?
        };
        let ids = self.sack.whatprovides(&reldep);
        Ok(self.sack.latest_per_name(&ids))
    }

    fn reldep_matches(&self, reldep: &Reldep) -> Vec<PkgId> {
        self.sack.whatprovides(reldep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sack::tests::pkg;

    fn sack() -> Sack {
        let mut maven_lib = pkg("maven-lib", "3.5.4-1.fc29", "maven-3.5.4-1.fc29.src.rpm",
            &[], &["mvn(org.apache.maven:maven-core) = 3.5.4"], &["/usr/share/java/maven/maven-core.jar"]);
        maven_lib.requires.push(Reldep::unversioned("(guava or guava20)"));
        Sack::new(vec![
            pkg("maven", "3.5.4-1.fc29", "maven-3.5.4-1.fc29.src.rpm",
                &["mvn(org.apache.maven:maven-core)", "rpmlib(CompressedFileNames) <= 3.0.4-1", "/usr/bin/java"], &[], &["/usr/bin/mvn"]),
            maven_lib,
            pkg("java-1.8.0-openjdk-headless", "1:1.8.0.191-4.fc29", "java-1.8.0-openjdk-1.8.0.191-4.fc29.src.rpm",
                &[], &["java-headless = 1:1.8.0.191"], &["/usr/bin/java"]),
            pkg("java-11-openjdk-headless", "1:11.0.1-2.fc29", "java-11-openjdk-11.0.1-2.fc29.src.rpm",
                &[], &["java-headless = 1:11.0.1"], &["/usr/bin/java"]),
            pkg("xmvn", "3.0.0-18.fc29", "xmvn-3.0.0-18.fc29.src.rpm",
                &["missing-dependency"], &[], &[]),
        ])
    }

    #[test]
    fn test_run_goal_follows_requires() {
        let sack = sack();
        let solver = SackSolver::new(&sack);
        let goal = solver.run_goal(&["maven".to_string()]);
        assert!(goal.resolved);
        assert_eq!(goal.installs, BTreeSet::from([0, 1, 3]));
    }

    #[test]
    fn test_run_goal_reports_problems() {
        let sack = sack();
        let solver = SackSolver::new(&sack);
        let goal = solver.run_goal(&["xmvn".to_string(), "ant".to_string(), "(ant or maven)".to_string()]);
        assert!(!goal.resolved);
        assert_eq!(
            goal.problems,
            vec![
                "package ant does not exist".to_string(),
                "nothing provides missing-dependency needed by xmvn-3.0.0-18.fc29.noarch".to_string(),
            ]
        );
    }

    #[test]
    fn test_prefers_exact_name_match() {
        let sack = Sack::new(vec![
            pkg("ant-junit", "1.10.5-1.fc29", "ant-1.10.5-1.fc29.src.rpm", &[], &["ant = 2.0"], &[]),
            pkg("ant", "1.10.5-1.fc29", "ant-1.10.5-1.fc29.src.rpm", &[], &[], &[]),
        ]);
        let solver = SackSolver::new(&sack);
        let goal = solver.run_goal(&["ant".to_string()]);
        assert_eq!(goal.installs, BTreeSet::from([1]));
    }

    #[test]
    fn test_builddep_matches() -> Result<()> {
        let sack = sack();
        let solver = SackSolver::new(&sack);
        assert_eq!(solver.builddep_matches("/usr/bin/java")?, vec![2, 3]);
        assert_eq!(solver.builddep_matches("java-headless >= 1:11")?, vec![3]);
        assert!(solver.builddep_matches("ant")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_reldep_matches() {
        let sack = sack();
        let solver = SackSolver::new(&sack);
        assert_eq!(solver.reldep_matches(&Reldep::unversioned("java-headless")), vec![2, 3]);
    }
}
