use crate::args::Args;
use crate::collect::{KojiInstances, Matrix};
use crate::config::Profile;
use crate::notes::Notes;
use crate::report::UpstreamStatus;
use crate::upstream::{Anitya, Cache};
use chrono::{Local, Utc};
use clap::Parser;
use colored::*;
use env_logger::Env;
use javapkg_common::errors::*;
use javapkg_common::http;
use javapkg_common::utils;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

pub mod args;
pub mod collect;
pub mod config;
pub mod notes;
pub mod report;
pub mod upstream;

/// Packages whose reference build is older than upstream.
fn behind_upstream(matrix: &Matrix) -> Vec<(&str, &str, &str)> {
    matrix
        .rows
        .iter()
        .filter(|(_, row)| {
            UpstreamStatus::of(&row.reference, &row.upstream) == UpstreamStatus::Downgrade
        })
        .map(|(package, row)| (package.as_str(), row.reference.as_str(), row.upstream.as_str()))
        .collect()
}

fn print_summary(matrix: &Matrix) {
    let behind = behind_upstream(matrix);
    for (package, reference, upstream) in &behind {
        println!("{:30} {} -> {}", package.bold(), reference.yellow(), upstream.green());
    }
    println!(
        "{} of {} packages in {} are behind upstream",
        behind.len().to_string().bold(),
        matrix.rows.len(),
        matrix.reference
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    if args.color {
        debug!("Bypass tty detection and always use colors");
        colored::control::set_override(true);
    }

    let started = Instant::now();
    let config =
        javapkg_common::config::load(args.config.as_ref()).context("Failed to load config file")?;
    let profile = Profile::load(&args.profile)?;
    let notes = Notes::load(profile.exceptions.as_deref(), profile.comments.as_deref())?;

    let client = http::client(&config.http)?;
    let koji = KojiInstances::new(&client, &config, &profile.instances())?;
    let anitya = Anitya::new(client, &profile.upstream);

    let mut cache = match &profile.upstream.cache {
        Some(path) => Cache::load(path)?,
        None => Cache::default(),
    };

    let now = Local::now();
    let matrix = collect::collect(&koji, &anitya, &profile, &mut cache, now.with_timezone(&Utc))?;
    if let Some(path) = &profile.upstream.cache {
        cache.save(path)?;
    }

    let html = report::render(&matrix, &notes, &profile.stylesheet)
        .context("Failed to render report")?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(utils::timestamped_filename("versions", &now, "html")));
    fs::write(&output, html).with_context(|| format!("Failed to write {:?}", output))?;

    print_summary(&matrix);
    info!(
        "Wrote {:?} after {}",
        output,
        utils::secs_to_human(started.elapsed().as_secs() as i64)
    );

    Ok(())
}
