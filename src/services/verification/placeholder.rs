//! Placeholder scan.
//!
//! Static heuristics for unfinished output: marker strings such as `TODO` or
//! `lorem ipsum`, and empty files.

use async_trait::async_trait;

use super::traits::{CheckInput, VerificationCheck};
use crate::domain::models::CheckResult;

const MAX_REPORTED: usize = 5;

fn in_comment(prefix: &str) -> bool {
    let trimmed = prefix.trim_start();
    prefix.contains("//")
        || prefix.contains("/*")
        || prefix.contains("<!--")
        || trimmed.starts_with('*')
        || trimmed.starts_with('#')
}

/// Marker used as a name in code: an attribute (`placeholder="Email"`), an
/// object or type key (`placeholder: string`), or a destructured binding.
fn used_as_identifier(prefix: &str, rest: &str) -> bool {
    if in_comment(prefix) {
        return false;
    }
    let mut next = rest.trim_start().chars();
    match next.next() {
        Some('=') => next.next() != Some('='),
        Some(':' | '?' | ',' | '}' | ')') => true,
        _ => false,
    }
}

/// Marker occurrence not embedded in a longer word (`todo` must not match
/// `todos`) and not used as an identifier.
fn contains_marker(line: &str, marker: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    line.match_indices(marker).any(|(start, m)| {
        let prefix = &line[..start];
        let rest = &line[start + m.len()..];
        let before = prefix.chars().next_back();
        let after = rest.chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word) && !used_as_identifier(prefix, rest)
    })
}

pub struct PlaceholderScan {
    markers: Vec<String>,
}

impl PlaceholderScan {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl VerificationCheck for PlaceholderScan {
    fn name(&self) -> &str {
        "placeholder-scan"
    }

    fn blocking(&self) -> bool {
        true
    }

    async fn run(&self, input: &CheckInput<'_>) -> anyhow::Result<CheckResult> {
        let mut findings = Vec::new();
        for (path, content) in input.snapshot.files() {
            if content.trim().is_empty() {
                findings.push(format!("{path}: empty file"));
                continue;
            }
            let lowered = content.to_lowercase();
            for (line_no, line) in lowered.lines().enumerate() {
                if let Some(marker) = self.markers.iter().find(|m| contains_marker(line, m)) {
                    findings.push(format!("{path}:{}: {marker}", line_no + 1));
                }
            }
        }

        if findings.is_empty() {
            return Ok(CheckResult::pass(
                self.name(),
                format!("{} file(s) clean", input.snapshot.len()),
            ));
        }

        let total = findings.len();
        findings.truncate(MAX_REPORTED);
        let mut detail = findings.join("; ");
        if total > MAX_REPORTED {
            detail.push_str(&format!(" (+{} more)", total - MAX_REPORTED));
        }
        Ok(CheckResult::fail(self.name(), detail))
    }
}
