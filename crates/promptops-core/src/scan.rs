//! Lightweight text scanners run over a build before evaluation. Added lines
//! are checked for hardcoded secrets, hardcoded URLs and weasel words; the
//! task prompt is checked for acceptance criteria.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::diff::ParsedDiff;

const SECRET_NAMES: &[&str] = &[
    "password",
    "api_key",
    "token",
    "secret",
    "key",
    "credential",
    "private_key",
    "access_token",
];

const WEASEL_WORDS: &[&str] = &[
    "temporarily",
    "just to pass",
    "quick fix",
    "workaround",
    "for now",
    "TODO",
    "FIXME",
];

const BULLETS: &[&str] = &["- ", "* ", "• ", "✓ ", "✅ "];

fn secret_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        SECRET_NAMES
            .iter()
            .filter_map(|name| {
                RegexBuilder::new(&format!(r#"{name}\s*=\s*["'][^"']+["']"#))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect()
    })
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:https?|ftp|wss?)://[^\s"']+"#).expect("valid url regex")
    })
}

fn weasel_patterns() -> &'static [(&'static str, Regex)] {
    static RE: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RE.get_or_init(|| {
        WEASEL_WORDS
            .iter()
            .filter_map(|word| {
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word)))
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|re| (*word, re))
            })
            .collect()
    })
}

fn count_added_lines(diff: &ParsedDiff, matches: impl Fn(&str) -> bool) -> u32 {
    let hits = diff.added_lines().filter(|(_, line)| matches(line)).count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

/// Added lines that assign a literal to a credential-like name. A line
/// matching several names counts once.
pub fn count_secrets(diff: &ParsedDiff) -> u32 {
    count_added_lines(diff, |line| secret_patterns().iter().any(|re| re.is_match(line)))
}

/// Added lines containing a hardcoded URL.
pub fn count_urls(diff: &ParsedDiff) -> u32 {
    count_added_lines(diff, |line| url_pattern().is_match(line))
}

/// Weasel words found on added lines, deduplicated and sorted.
pub fn find_weasel_words(diff: &ParsedDiff) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (_, line) in diff.added_lines() {
        for (word, re) in weasel_patterns() {
            if re.is_match(line) {
                found.insert(word.to_string());
            }
        }
    }
    found.into_iter().collect()
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#')
}

/// Bullet lines under an "Acceptance Criteria" heading, up to the next
/// heading. `None` when the prompt has no such section.
pub fn extract_acceptance_criteria(prompt: &str) -> Option<Vec<String>> {
    let mut lines = prompt.lines().map(str::trim);
    lines.find(|line| {
        let lower = line.to_lowercase();
        lower.contains("acceptance criteria") && (is_heading(line) || lower.ends_with(':'))
    })?;

    let criteria = lines
        .take_while(|line| !is_heading(line))
        .filter_map(|line| {
            BULLETS
                .iter()
                .find_map(|bullet| line.strip_prefix(bullet))
                .map(|item| item.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect();
    Some(criteria)
}
