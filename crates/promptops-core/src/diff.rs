//! Minimal unified-diff reader.
//!
//! Extracts the per-file metadata the gate needs: path, status and the added
//! and removed lines of each hunk. Hunk bodies are consumed by their declared
//! line counts, so removed lines that happen to start with `--` are not
//! mistaken for file headers.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a file was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file section of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Post-change path (pre-change path for deletions).
    pub path: String,
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl FileDiff {
    fn new(path: String, old_path: Option<String>) -> Self {
        Self {
            path,
            old_path,
            status: FileStatus::Modified,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn changed_lines(&self) -> u64 {
        (self.added.len() + self.removed.len()) as u64
    }

    /// Whether `token` appears on any added or removed line.
    pub fn mentions(&self, token: &str) -> bool {
        self.added
            .iter()
            .chain(&self.removed)
            .any(|line| line.contains(token))
    }
}

/// A parsed unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDiff {
    pub files: Vec<FileDiff>,
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -\d+(?:,(\d+))? \+\d+(?:,(\d+))? @@").expect("valid hunk regex")
    })
}

fn strip_prefix(path: &str) -> Option<String> {
    let path = path.trim();
    // `--- a/file\t2024-01-01 ...` style timestamps
    let path = path.split('\t').next().unwrap_or(path);
    if path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

impl ParsedDiff {
    pub fn parse(text: &str) -> Self {
        let mut files: Vec<FileDiff> = Vec::new();
        let mut old_left = 0usize;
        let mut new_left = 0usize;
        let mut pending_old: Option<Option<String>> = None;
        // Set while a `diff --git` section still expects its ---/+++ pair.
        let mut git_section_open = false;

        for line in text.lines() {
            if old_left > 0 || new_left > 0 {
                let Some(file) = files.last_mut() else {
                    old_left = 0;
                    new_left = 0;
                    continue;
                };
                if let Some(rest) = line.strip_prefix('+') {
                    file.added.push(rest.to_string());
                    new_left = new_left.saturating_sub(1);
                } else if let Some(rest) = line.strip_prefix('-') {
                    file.removed.push(rest.to_string());
                    old_left = old_left.saturating_sub(1);
                } else if !line.starts_with('\\') {
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("diff --git ") {
                let (old, new) = match rest.rsplit_once(" b/") {
                    Some((old, new)) => (strip_prefix(old), Some(new.trim().to_string())),
                    None => (None, strip_prefix(rest)),
                };
                let path = new.or_else(|| old.clone()).unwrap_or_default();
                files.push(FileDiff::new(path, old));
                pending_old = None;
                git_section_open = true;
            } else if line.starts_with("new file mode") {
                if let Some(file) = files.last_mut() {
                    file.status = FileStatus::Added;
                }
            } else if line.starts_with("deleted file mode") {
                if let Some(file) = files.last_mut() {
                    file.status = FileStatus::Deleted;
                }
            } else if let Some(from) = line.strip_prefix("rename from ") {
                if let Some(file) = files.last_mut() {
                    file.status = FileStatus::Renamed;
                    file.old_path = Some(from.trim().to_string());
                }
            } else if let Some(rest) = line.strip_prefix("--- ") {
                pending_old = Some(strip_prefix(rest));
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                let old = pending_old.take().flatten();
                let new = strip_prefix(rest);
                if !git_section_open {
                    let path = new.clone().or_else(|| old.clone()).unwrap_or_default();
                    files.push(FileDiff::new(path, old.clone()));
                }
                git_section_open = false;
                if let Some(file) = files.last_mut() {
                    match (old, new) {
                        (None, Some(_)) => file.status = FileStatus::Added,
                        (Some(old_path), None) => {
                            file.status = FileStatus::Deleted;
                            file.path = old_path;
                        }
                        _ => {}
                    }
                }
            } else if let Some(caps) = hunk_header().captures(line) {
                let count = |i: usize| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse::<usize>().ok())
                        .unwrap_or(1)
                };
                old_left = count(1);
                new_left = count(2);
                git_section_open = false;
            }
        }

        Self { files }
    }

    /// Additions plus deletions across all files.
    pub fn changed_lines(&self) -> u64 {
        self.files.iter().map(FileDiff::changed_lines).sum()
    }

    /// Every added line, with the path it was added to.
    pub fn added_lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .flat_map(|f| f.added.iter().map(move |l| (f.path.as_str(), l.as_str())))
    }
}
