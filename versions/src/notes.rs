use javapkg_common::errors::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Hand-maintained annotations of the report.
#[derive(Debug, Default, PartialEq)]
pub struct Notes {
    /// Packages that are known to differ on purpose
    pub exceptions: HashSet<String>,
    /// Free-form comment per package, the column is only shown if comments are configured
    pub comments: Option<HashMap<String, String>>,
}

impl Notes {
    pub fn load(exceptions: Option<&Path>, comments: Option<&Path>) -> Result<Notes> {
        let exceptions = match exceptions {
            Some(path) => parse_exceptions(&read(path)?),
            None => HashSet::new(),
        };
        let comments = match comments {
            Some(path) => Some(parse_comments(&read(path)?)),
            None => None,
        };
        Ok(Notes {
            exceptions,
            comments,
        })
    }

    pub fn is_exception(&self, package: &str) -> bool {
        self.exceptions.contains(package)
    }

    pub fn comment(&self, package: &str) -> Option<&str> {
        self.comments.as_ref()?.get(package).map(String::as_str)
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

pub fn parse_exceptions(buf: &str) -> HashSet<String> {
    buf.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Comments are a Markdown document with one heading per package.
pub fn parse_comments(buf: &str) -> HashMap<String, String> {
    let mut comments = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in buf.lines().map(str::trim) {
        if line.starts_with('#') {
            if let Some((package, text)) = current.take() {
                comments.insert(package, text.join(" "));
            }
            let package = line.trim_start_matches('#').trim();
            if !package.is_empty() {
                current = Some((package.to_string(), Vec::new()));
            }
        } else if !line.is_empty() {
            if let Some((_, text)) = &mut current {
                text.push(line);
            }
        }
    }
    if let Some((package, text)) = current {
        comments.insert(package, text.join(" "));
    }

    comments
}
