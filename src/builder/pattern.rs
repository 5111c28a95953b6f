//! Include/exclude routing of build inputs
//!
//! Patterns are evaluated in order and every matching pattern overwrites the
//! running verdict, so the last match wins. A path nothing matches is
//! excluded.

use crate::error::{DeployError, Result};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// `*` crosses `/`, case is ignored, hidden names need a literal dot
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: true,
};

/// Pattern verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Include,
    Exclude,
}

/// One routing pattern as written in the build configuration
///
/// Exactly one of `include` / `exclude` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Bucket that matching files are packed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

impl PatternConfig {
    pub fn include(glob: impl Into<String>) -> Self {
        Self {
            include: Some(glob.into()),
            ..Self::default()
        }
    }

    pub fn exclude(glob: impl Into<String>) -> Self {
        Self {
            exclude: Some(glob.into()),
            ..Self::default()
        }
    }

    /// Route matches into the bucket `name`
    pub fn into_archive(mut self, name: impl Into<String>) -> Self {
        self.archive = Some(name.into());
        self
    }
}

/// A compiled routing pattern
#[derive(Debug, Clone)]
pub struct PatternRule {
    kind: RuleKind,
    pattern: Pattern,
    archive: Option<String>,
}

impl PatternRule {
    pub fn new(kind: RuleKind, glob: &str, archive: Option<String>) -> Result<Self> {
        let pattern = Pattern::new(glob).map_err(|e| {
            DeployError::config(format!("Invalid glob pattern '{}': {}", glob, e))
        })?;
        Ok(Self {
            kind,
            pattern,
            archive,
        })
    }

    pub fn from_config(config: &PatternConfig) -> Result<Self> {
        match (&config.include, &config.exclude) {
            (Some(glob), None) => Self::new(RuleKind::Include, glob, config.archive.clone()),
            (None, Some(glob)) => Self::new(RuleKind::Exclude, glob, config.archive.clone()),
            _ => Err(DeployError::config(
                "Each pattern needs exactly one of 'include' or 'exclude'",
            )),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }
}

/// Where a build input goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Excluded,
    /// Delivered as its own object
    Standalone,
    /// Packed into the named bucket
    Bucket(String),
}

/// Ordered pattern list
#[derive(Debug, Clone, Default)]
pub struct PathRouter {
    rules: Vec<PatternRule>,
}

impl PathRouter {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(patterns: &[PatternConfig]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(PatternRule::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    /// Whether `path` is included at all
    pub fn is_included(&self, path: &str) -> bool {
        self.route(path) != Route::Excluded
    }

    /// Route a relative, `/`-separated path
    pub fn route(&self, path: &str) -> Route {
        let mut included = false;
        let mut archive: Option<&str> = None;

        for rule in self.rules.iter().filter(|rule| rule.matches(path)) {
            included = rule.kind == RuleKind::Include;
            if let Some(name) = &rule.archive {
                archive = Some(name.as_str());
            }
        }

        match (included, archive) {
            (false, _) => Route::Excluded,
            (true, Some(name)) => Route::Bucket(name.to_string()),
            (true, None) => Route::Standalone,
        }
    }
}
