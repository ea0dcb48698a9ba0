use crate::buildsys::BuildSystem;
use crate::closure::Closure;
use crate::config::Profile;
use crate::depsolve::Depsolve;
use crate::sack::{PkgId, Sack};
use javapkg_common::errors::*;
use javapkg_common::rpm::name_of;
use petgraph::algo::{condensation, toposort};
use petgraph::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type DepMap = BTreeMap<String, BTreeSet<String>>;

/// Everything known about the module components after the closure is computed.
#[derive(Debug, Default, PartialEq)]
pub struct Analysis {
    pub api_srpms: BTreeSet<String>,
    pub filtered: BTreeSet<String>,
    /// SRPM -> module SRPMs that build-require one of its packages
    pub build_deps: DepMap,
    /// SRPM -> module SRPMs with a package requiring one of its packages
    pub runtime_deps: DepMap,
    /// Pinned SRPMs, `None` if the commit couldn't be found
    pub refs: HashMap<String, Option<String>>,
    pub buildorder: Option<BTreeMap<String, u32>>,
}

impl Analysis {
    /// Git ref of a component, if there is one to pin.
    ///
    /// Pinned components without a known commit get no ref, `default_ref` only applies to the others.
    pub fn git_ref<'a>(&'a self, profile: &'a Profile, srpm: &str) -> Option<&'a str> {
        match self.refs.get(srpm) {
            Some(pinned) => pinned.as_deref(),
            None => profile.default_ref.as_deref(),
        }
    }
}

fn add(map: &mut DepMap, key: &str, value: &str) {
    map.entry(key.to_string())
        .or_default()
        .insert(value.to_string());
}

pub fn analyze<D: Depsolve, B: BuildSystem>(
    sack: &Sack,
    solver: &D,
    buildsys: &B,
    profile: &Profile,
    closure: &Closure,
) -> Result<Analysis> {
    let ours = |id: &PkgId| closure.srpms.contains(&sack.get(*id).sourcerpm);

    let api_srpms = closure
        .installed
        .iter()
        .map(|id| sack.get(*id))
        .filter(|pkg| profile.api.contains(&pkg.name))
        .map(|pkg| pkg.sourcerpm.clone())
        .collect();

    let mut filtered = profile.filter.clone();
    if profile.filter_unused {
        let srpms = closure.srpms.iter().cloned().collect::<Vec<_>>();
        let used = closure
            .installed
            .iter()
            .map(|id| sack.get(*id).name.as_str())
            .collect::<BTreeSet<_>>();
        filtered.extend(
            buildsys
                .binary_rpms(&srpms)?
                .into_iter()
                .filter(|name| !used.contains(name.as_str())),
        );
    }

    let mut build_deps = DepMap::new();
    for (br, srpms) in &closure.br_map {
        if br.starts_with('(') {
            continue;
        }
        let matches = match solver.builddep_matches(br) {
            Ok(matches) => matches,
            Err(err) => {
                warn!("Failed to match build requirement {:?}: {:#}", br, err);
                continue;
            }
        };
        for dep in matches.iter().filter(|id| ours(id)) {
            for srpm in srpms {
                add(&mut build_deps, &sack.get(*dep).sourcerpm, srpm);
            }
        }
    }

    let mut runtime_deps = DepMap::new();
    for pkg in closure.installed.iter().filter(|id| ours(id)).map(|id| sack.get(*id)) {
        for reldep in &pkg.requires {
            for dep in solver.reldep_matches(reldep) {
                let dep = sack.get(dep);
                if dep.sourcerpm != pkg.sourcerpm {
                    add(&mut runtime_deps, &dep.sourcerpm, &pkg.sourcerpm);
                }
            }
        }
    }

    info!("Resolving git refs...");
    let pinned = closure
        .srpms
        .iter()
        .filter(|srpm| profile.full_refs || profile.frozen_refs.contains(name_of(srpm)))
        .cloned()
        .collect::<Vec<_>>();
    let refs = buildsys.git_refs(&pinned)?;

    let buildorder = if profile.buildorder {
        Some(build_order(&closure.srpms, &build_deps)?)
    } else {
        None
    };

    Ok(Analysis {
        api_srpms,
        filtered,
        build_deps,
        runtime_deps,
        refs,
        buildorder,
    })
}

/// Assign every SRPM a build order, components of a build dependency cycle share one.
pub fn build_order(srpms: &BTreeSet<String>, build_deps: &DepMap) -> Result<BTreeMap<String, u32>> {
    let mut graph = DiGraph::<String, ()>::new();
    let index = srpms
        .iter()
        .map(|srpm| (srpm.as_str(), graph.add_node(srpm.clone())))
        .collect::<HashMap<_, _>>();

    for (dep, dependents) in build_deps {
        let Some(&from) = index.get(dep.as_str()) else {
            continue;
        };
        for dependent in dependents.iter().filter(|d| *d != dep) {
            if let Some(&to) = index.get(dependent.as_str()) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let graph = condensation(graph, true);
    let sorted = toposort(&graph, None)
        .map_err(|cycle| format_err!("Unexpected cycle in build order at {:?}", cycle.node_id()))?;

    let mut depth = vec![0u32; graph.node_count()];
    for node in sorted {
        depth[node.index()] = graph
            .neighbors_directed(node, Incoming)
            .map(|dep| depth[dep.index()] + 1)
            .max()
            .unwrap_or(0);
    }

    let mut order = BTreeMap::new();
    for node in graph.node_indices() {
        for srpm in &graph[node] {
            order.insert(srpm.clone(), 10 * (1 + depth[node.index()]));
        }
    }
    Ok(order)
}
