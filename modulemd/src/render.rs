use crate::analysis::Analysis;
use crate::config::Profile;
use javapkg_common::rpm::{name_of, strip_src_rpm};
use std::collections::BTreeSet;

const RATIONALE_INDENT: usize = 20;
const RATIONALE_CONT_INDENT: usize = 24;
const MAX_LINE: usize = 80;

/// Lines of a `Runtime dependency of ...` style rationale, wrapped before column 80.
pub fn format_rationale(kind: &str, srpms: &BTreeSet<String>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = format!("{:indent$}{} of", "", kind, indent = RATIONALE_INDENT);
    for srpm in srpms {
        let name = name_of(srpm);
        if line.len() + name.len() + 2 >= MAX_LINE {
            lines.push(line);
            line = " ".repeat(RATIONALE_CONT_INDENT);
        }
        line.push(' ');
        line.push_str(name);
        line.push(',');
    }
    if line.ends_with(',') {
        line.pop();
    }
    line.push('.');
    lines.push(line);
    lines
}

/// Write the modulemd v1 document of the module.
pub fn render(profile: &Profile, stream: &str, srpms: &BTreeSet<String>, analysis: &Analysis) -> String {
    let mut y = Vec::<String>::new();
    y.push("---".into());
    y.push("document: modulemd".into());
    y.push("version: 1".into());
    y.push("data:".into());
    y.push(format!("    summary: {}", profile.summary));
    y.push("    description: >-".into());
    for line in &profile.description {
        y.push(format!("        {}", line));
    }
    y.push("    license:".into());
    y.push("        module:".into());
    for license in &profile.license {
        y.push(format!("            - {}", license));
    }

    y.push("    dependencies:".into());
    y.push("        buildrequires:".into());
    if profile.bootstrap {
        y.push("            bootstrap: master".into());
    } else {
        for dep in &profile.buildrequires {
            y.push(format!("            {}: {}", dep, profile.stream_for(dep, stream)));
        }
    }
    y.push("        requires:".into());
    for dep in &profile.requires {
        y.push(format!("            {}: {}", dep, profile.stream_for(dep, stream)));
    }

    y.push("    profiles:".into());
    for (name, rpms) in &profile.profiles {
        y.push(format!("        {}:", name));
        y.push("            rpms:".into());
        for rpm in rpms {
            y.push(format!("                - {}", rpm));
        }
    }
    y.push("    api:".into());
    y.push("        rpms:".into());
    for rpm in &profile.api {
        y.push(format!("            - {}", rpm));
    }
    if !analysis.filtered.is_empty() {
        y.push("    filter:".into());
        y.push("        rpms:".into());
        for rpm in &analysis.filtered {
            y.push(format!("            - {}", rpm));
        }
    }

    y.push("    buildopts:".into());
    y.push("        rpms:".into());
    y.push("            macros: |".into());
    for (name, value) in &profile.macros {
        y.push(format!("                %{} {}", name, value));
    }

    y.push("    components:".into());
    y.push("        rpms:".into());
    for srpm in srpms {
        y.push(format!("            # {}", strip_src_rpm(srpm)));
        y.push(format!("            {}:", name_of(srpm)));
        if let Some(r) = analysis.git_ref(profile, srpm) {
            y.push(format!("                ref: {}", r));
        }
        if let Some(order) = analysis.buildorder.as_ref().and_then(|o| o.get(srpm)) {
            y.push(format!("                buildorder: {}", order));
        }
        y.push("                rationale: >".into());
        if analysis.api_srpms.contains(srpm) {
            y.push("                    Module API.".into());
        }
        if let Some(dependents) = analysis.runtime_deps.get(srpm) {
            y.extend(format_rationale("Runtime dependency", dependents));
        }
        if let Some(dependents) = analysis.build_deps.get(srpm) {
            y.extend(format_rationale("Build dependency", dependents));
        }
    }

    let mut out = y.join("\n");
    out.push('\n');
    out
}
