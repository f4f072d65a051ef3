//! Rule construction and job-name parsing.
//!
//! A job name such as `debug-fullTest-Core400S-Cloud-API-ci` carries three
//! facts: the stage (its suffix), whether it is a debug run (its prefix), and
//! the canonical name used as the test-plan mapping key (the name with both
//! modifiers removed).

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ConfigError;
use crate::types::{Rule, Stage};

/// Build the selection rule for `stage`.
///
/// Pure: validates the stage token and assembles namespaces
/// `[cross-env, stage]` with groups `[SHARED, DEVICE, (DEBUG)]`.
pub fn build_rule<I, S>(stage: &str, identifiers: I, debug: bool) -> Result<Rule, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let stage: Stage = stage.parse()?;
    Ok(Rule::for_stage(stage, identifiers, debug))
}

/// Facts derived once from a CI job name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobIdentity {
    pub raw: String,
    pub stage: Stage,
    pub is_debug: bool,
    pub canonical_name: String,
}

/// Parse a job name into its [`JobIdentity`].
///
/// Fails with [`ConfigError::UnrecognizedStage`] when the name does not end
/// with a stage token (case-insensitive).
pub fn parse_job_identity(raw: &str) -> Result<JobIdentity, ConfigError> {
    let lowered = raw.to_lowercase();

    let mut tokens = Stage::ALL;
    tokens.sort_by_key(|s| std::cmp::Reverse(s.as_str().len()));
    let stage = tokens
        .into_iter()
        .find(|s| lowered.ends_with(s.as_str()))
        .ok_or_else(|| ConfigError::UnrecognizedStage {
            job: raw.to_owned(),
        })?;

    let is_debug = lowered.starts_with("debug");

    let without_prefix = strip(prefix_pattern(), raw);
    let canonical_name = strip(suffix_pattern(), &without_prefix);

    Ok(JobIdentity {
        raw: raw.to_owned(),
        stage,
        is_debug,
        canonical_name,
    })
}

fn strip(pattern: &Regex, name: &str) -> String {
    pattern.replace(name, "").into_owned()
}

fn prefix_pattern() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"(?i)^(regression|debug)[-_]").expect("constant prefix pattern"))
}

fn suffix_pattern() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(r"(?i)[-_](ci|testonline|predeploy|production)$")
            .expect("constant suffix pattern")
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
