use crate::args::Args;
use crate::buildsys::KojiBuildSystem;
use crate::config::Profile;
use crate::depsolve::SackSolver;
use crate::sack::Sack;
use clap::Parser;
use env_logger::Env;
use javapkg_common::errors::*;
use javapkg_common::http;
use javapkg_common::koji::{self, KojiSession};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub mod analysis;
pub mod args;
pub mod buildsys;
pub mod closure;
pub mod config;
pub mod depsolve;
pub mod render;
pub mod repodata;
pub mod sack;

/// The module is named after the directory of its git checkout.
fn detect_module() -> Result<String> {
    let cwd = env::current_dir()?;
    let name = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Failed to detect module name from {:?}", cwd))?;
    Ok(name.to_string())
}

/// The stream is named after the checked out branch.
fn parse_stream(head: &str) -> Result<String> {
    let re = Regex::new(r"ref: refs/heads/(.*)")?;
    let first = head.lines().next().unwrap_or_default();
    let caps = re
        .captures(first)
        .with_context(|| format!("Not on a branch: {:?}", first))?;
    Ok(caps[1].to_string())
}

fn detect_stream<P: AsRef<Path>>(git_head: P) -> Result<String> {
    let head = fs::read_to_string(git_head.as_ref())
        .with_context(|| format!("Failed to read {:?}", git_head.as_ref()))?;
    parse_stream(&head)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    let config =
        javapkg_common::config::load(args.config.as_ref()).context("Failed to load config file")?;
    let profile = Profile::load(&args.profile)?;

    let module = match args.module {
        Some(module) => module,
        None => detect_module()?,
    };
    let stream = match args.stream {
        Some(stream) => stream,
        None => detect_stream(".git/HEAD")?,
    };
    info!("Generating modulemd for {}:{}", module, stream);

    let instance = config.koji_instance(&profile.koji.instance)?;
    let client = http::client(&config.http)?;
    let session = KojiSession::new(client.clone(), &instance.hub);

    let tag = &profile.koji.tag;
    let arch = &profile.koji.arch;
    let repo_id = session
        .get_repo(tag)
        .with_context(|| format!("Failed to find repo of tag {:?}", tag))?;
    let url = koji::repo_url(instance.topurl()?, tag, repo_id, arch);
    let cache = config
        .cache
        .dir()
        .join(format!("{}-{}-{}", tag, repo_id, arch));

    info!("Loading sack...");
    let sack = Sack::new(repodata::load(&client, &url, &cache)?);
    if sack.is_empty() {
        bail!("Repo {} has no binary packages", url);
    }
    let solver = SackSolver::new(&sack);
    let buildsys = KojiBuildSystem::new(&session, arch.as_str());

    let closure = closure::compute(&sack, &solver, &buildsys, &profile)?;
    let analysis = analysis::analyze(&sack, &solver, &buildsys, &profile, &closure)?;
    let yaml = render::render(&profile, &stream, &closure.srpms, &analysis);

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.yaml", module)));
    fs::write(&output, yaml).with_context(|| format!("Failed to write {:?}", output))?;
    info!(
        "Wrote {:?} with {} components",
        output,
        closure.srpms.len()
    );

    Ok(())
}
