use crate::collect::{Matrix, Row};
use crate::notes::Notes;
use javapkg_common::rpm::vercmp;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{self, Write as _};

/// How the reference version relates to the upstream one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Unknown,
    UpToDate,
    /// the reference is behind upstream
    Downgrade,
    /// the reference is ahead of upstream
    Newer,
}

impl UpstreamStatus {
    pub fn of(reference: &str, upstream: &str) -> UpstreamStatus {
        if upstream.is_empty() {
            return UpstreamStatus::Unknown;
        }
        match vercmp(reference, upstream) {
            Ordering::Equal => UpstreamStatus::UpToDate,
            Ordering::Less => UpstreamStatus::Downgrade,
            Ordering::Greater => UpstreamStatus::Newer,
        }
    }

    pub fn class(self) -> &'static str {
        match self {
            UpstreamStatus::Unknown => "unknown-version",
            UpstreamStatus::UpToDate => "up-to-date",
            UpstreamStatus::Downgrade => "downgrade",
            UpstreamStatus::Newer => "mbi-newer",
        }
    }
}

pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Collapse runs of equal versions into `(colspan, version)` cells.
pub fn release_cells(versions: &[String]) -> Vec<(usize, &str)> {
    let mut cells: Vec<(usize, &str)> = Vec::new();
    for version in versions {
        if let Some((colspan, last)) = cells.last_mut() {
            if vercmp(*last, version) == Ordering::Equal {
                *colspan += 1;
                continue;
            }
        }
        cells.push((1, version));
    }
    cells
}

fn write_row(out: &mut String, package: &str, row: &Row, notes: &Notes, with_comments: bool) -> fmt::Result {
    out.push_str("<tr>\n");
    if notes.is_exception(package) {
        out.push_str("<td class=exception>");
    } else {
        out.push_str("<td>");
    }
    writeln!(out, "{}</td>", escape(package))?;

    for (colspan, version) in release_cells(&row.releases) {
        out.push_str("<td ");
        if colspan > 1 {
            write!(out, "colspan=\"{}\" ", colspan)?;
        }
        writeln!(out, "class=\"fedora\">{}</td>", escape(version))?;
    }

    writeln!(out, "<td class=\"mbi\">{}</td>", escape(&row.reference))?;
    let status = UpstreamStatus::of(&row.reference, &row.upstream);
    writeln!(
        out,
        "<td class=\"{}\">{}</td>",
        status.class(),
        escape(&row.upstream)
    )?;

    if with_comments {
        let comment = notes.comment(package).unwrap_or_default();
        writeln!(out, "<td class=\"notes\">{}</td>", escape(comment))?;
    }
    out.push_str("</tr>\n");
    Ok(())
}

pub fn render(matrix: &Matrix, notes: &Notes, stylesheet: &str) -> Result<String, fmt::Error> {
    let with_comments = notes.comments.is_some();

    let mut out = String::new();
    writeln!(out, "<link rel=stylesheet href=\"{}\">", escape(stylesheet))?;
    out.push_str("<table style=\"width:100%\">\n");
    out.push_str("<tr>\n<th>Package name</th>");
    for name in matrix.releases.iter().chain([&matrix.reference]) {
        write!(out, "<th>{}</th>", escape(name))?;
    }
    out.push_str("<th>upstream</th>");
    if with_comments {
        out.push_str("<th>Notes</th>");
    }
    out.push_str("\n</tr>\n");

    for (package, row) in &matrix.rows {
        write_row(&mut out, package, row, notes, with_comments)?;
    }
    out.push_str("</table>\n");
    Ok(out)
}
