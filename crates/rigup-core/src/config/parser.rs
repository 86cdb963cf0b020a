//! TOML plan parser with helpful error messages

use super::schema::PlanFile;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse a plan file with detailed error messages
pub fn parse_plan_toml(path: &Path) -> Result<PlanFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

    parse_plan_str(&content)
        .with_context(|| format!("Failed to parse plan file: {}", path.display()))
}

/// Parse plan content from string
pub fn parse_plan_str(content: &str) -> Result<PlanFile> {
    let plan: PlanFile = toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    plan.validate()?;

    Ok(plan)
}

/// Fingerprint of the plan source, recorded with every run.
pub fn plan_digest(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

/// Enhance TOML parsing errors with helpful context
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    // toml 0.8 reports a byte span; fall back to the "line N" text when absent
    let line_hint = error
        .span()
        .map(|span| content[..span.start.min(content.len())].lines().count().max(1))
        .or_else(|| {
            error_msg
                .lines()
                .find(|line| line.contains("line "))
                .and_then(|line| {
                    line.split("line ")
                        .nth(1)
                        .and_then(|s| s.split_whitespace().next())
                        .and_then(|s| s.trim_end_matches(',').parse::<usize>().ok())
                })
        });

    if let Some(line_num) = line_hint {
        let context = get_line_context(content, line_num);
        anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            context,
            error_msg
        )
    } else {
        anyhow::anyhow!("TOML parsing error: {}", error_msg)
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2).min(lines.len());
    let end = (line_num + 2).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
