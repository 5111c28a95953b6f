//! Library entries and their allow/disallow rules
//!
//! A library is a maven-style coordinate (`group:artifact:version`) plus
//! optional native classifiers per OS. Rules are folded in order and the last
//! matching rule decides, so a later `disallow` overrides an earlier `allow`.

use super::manifest::validate_relative;
use super::platform::{Environment, Os};
use crate::error::{DeployError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `group:artifact:version[:classifier]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl Coordinate {
    /// Parse a colon-delimited coordinate
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split(':').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(DeployError::config(format!(
                "Invalid library name '{}' - Expected 'group:artifact:version'",
                name
            )));
        }

        for segment in parts[0].split('.').chain(parts[1..].iter().copied()) {
            check_segment(name, segment)?;
        }

        let coordinate = Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
        };
        validate_relative(&coordinate.path(None))?;
        Ok(coordinate)
    }

    /// Repository-relative path of this artifact's jar
    ///
    /// `classifier` overrides the coordinate's own classifier.
    pub fn path(&self, classifier: Option<&str>) -> String {
        let classifier = classifier.or(self.classifier.as_deref());
        let file_name = match classifier {
            Some(c) => format!("{}-{}-{}.jar", self.artifact, self.version, c),
            None => format!("{}-{}.jar", self.artifact, self.version),
        };
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            file_name
        )
    }
}

/// A coordinate segment must be a single plain path component
pub(crate) fn check_segment(name: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(DeployError::config(format!(
            "Invalid library name '{}' - '{}' is not a plain path segment",
            name, segment
        )));
    }
    Ok(())
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        Ok(())
    }
}

/// Rule verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

/// OS constraint of a rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Os>,

    /// Regular expression matched against the OS version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One allow/disallow rule, optionally scoped to an OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
}

impl Rule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            os: None,
        }
    }

    /// Scope this rule to an OS
    pub fn on(mut self, os: Os) -> Self {
        self.os.get_or_insert_with(OsRule::default).name = Some(os);
        self
    }

    /// Scope this rule to OS versions matching `pattern`
    pub fn on_version(mut self, pattern: impl Into<String>) -> Self {
        self.os.get_or_insert_with(OsRule::default).version = Some(pattern.into());
        self
    }

    /// Whether this rule applies to `env`
    pub fn applies(&self, env: &Environment) -> bool {
        let Some(os) = &self.os else {
            return true;
        };

        if let Some(name) = os.name {
            if name != env.os {
                return false;
            }
        }

        if let Some(pattern) = &os.version {
            // Patterns are checked by validate(); an invalid one never matches
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(&env.os_version) {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }

        true
    }

    fn validate(&self) -> Result<()> {
        if let Some(pattern) = self.os.as_ref().and_then(|os| os.version.as_ref()) {
            Regex::new(pattern).map_err(|e| {
                DeployError::config(format!("Invalid OS version pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Fold `rules` over `env`; last matching rule wins, no rules means allowed
pub fn rules_allow(rules: &[Rule], env: &Environment) -> bool {
    if rules.is_empty() {
        return true;
    }

    rules.iter().fold(false, |allowed, rule| {
        if rule.applies(env) {
            rule.action == RuleAction::Allow
        } else {
            allowed
        }
    })
}

/// Post-extraction options for native archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Entry name prefixes that are not extracted
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A library entry of a package manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// `group:artifact:version[:classifier]`
    pub name: String,

    /// OS name → native classifier (may contain `${arch}`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub natives: BTreeMap<Os, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractOptions>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,

    /// Content signature of the main jar, when published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default)]
    pub size: u64,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            natives: BTreeMap::new(),
            extract: None,
            rules: Vec::new(),
            signature: None,
            size: 0,
        }
    }

    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::parse(&self.name)
    }

    /// Check the coordinate and rule patterns
    pub fn validate(&self) -> Result<()> {
        self.coordinate()?;
        for classifier in self.natives.values() {
            check_segment(&self.name, classifier)?;
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Whether this library applies to `env`
    pub fn matches(&self, env: &Environment) -> bool {
        rules_allow(&self.rules, env)
    }

    /// Native classifier for `env`, with `${arch}` substituted
    pub fn native_classifier(&self, env: &Environment) -> Option<String> {
        self.natives
            .get(&env.os)
            .map(|classifier| classifier.replace("${arch}", env.arch.bits()))
    }

    /// Entry prefixes excluded when extracting natives
    pub fn extract_excludes(&self) -> Vec<String> {
        self.extract
            .as_ref()
            .map(|e| e.exclude.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Arch;

    fn linux() -> Environment {
        Environment::new(Os::Linux, "6.1.0", Arch::X86_64)
    }

    fn macos(version: &str) -> Environment {
        Environment::new(Os::MacOS, version, Arch::Aarch64)
    }

    #[test]
    fn test_parse_coordinate() {
        let c = Coordinate::parse("org.lwjgl:lwjgl:3.3.1").unwrap();
        assert_eq!(c.group, "org.lwjgl");
        assert_eq!(c.artifact, "lwjgl");
        assert_eq!(c.version, "3.3.1");
        assert_eq!(c.path(None), "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1.jar");
        assert_eq!(
            c.path(Some("natives-linux")),
            "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"
        );
    }

    #[test]
    fn test_parse_coordinate_with_classifier() {
        let c = Coordinate::parse("a.b:c:1:sources").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("sources"));
        assert_eq!(c.to_string(), "a.b:c:1:sources");
    }

    #[test]
    fn test_parse_coordinate_invalid() {
        assert!(Coordinate::parse("just-a-name").is_err());
        assert!(Coordinate::parse("a::1").is_err());
        assert!(Coordinate::parse("a:b:c:d:e").is_err());
    }

    #[test]
    fn test_parse_coordinate_rejects_path_segments() {
        assert!(Coordinate::parse("a:../..:v").is_err());
        assert!(Coordinate::parse("a:b:..").is_err());
        assert!(Coordinate::parse("a..b:c:1").is_err());
        assert!(Coordinate::parse(".:c:1").is_err());
        assert!(Coordinate::parse("a:b/c:1").is_err());
        assert!(Coordinate::parse("a:b:1:x\\y").is_err());
        assert!(Coordinate::parse("a:b:1:..").is_err());
        assert!(Library::new("a:../..:v").validate().is_err());
        assert!(Coordinate::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").is_ok());
    }

    #[test]
    fn test_no_rules_always_allowed() {
        assert!(Library::new("a:b:1").matches(&linux()));
    }

    #[test]
    fn test_last_match_wins() {
        let mut lib = Library::new("a:b:1");
        lib.rules = vec![Rule::allow(), Rule::disallow().on(Os::MacOS)];
        assert!(lib.matches(&linux()));
        assert!(!lib.matches(&macos("13.0")));

        // Same rules reversed: the unscoped allow now overrides the disallow
        lib.rules = vec![Rule::disallow().on(Os::MacOS), Rule::allow()];
        assert!(lib.matches(&macos("13.0")));
    }

    #[test]
    fn test_only_scoped_allow() {
        let mut lib = Library::new("a:b:1");
        lib.rules = vec![Rule::allow().on(Os::MacOS)];
        assert!(!lib.matches(&linux()));
        assert!(lib.matches(&macos("13.0")));
    }

    #[test]
    fn test_os_version_pattern() {
        let mut lib = Library::new("a:b:1");
        lib.rules = vec![
            Rule::allow(),
            Rule::disallow().on(Os::MacOS).on_version("^10\\.5\\.\\d$"),
        ];
        assert!(!lib.matches(&macos("10.5.8")));
        assert!(lib.matches(&macos("10.6.1")));
    }

    #[test]
    fn test_invalid_version_pattern() {
        let mut lib = Library::new("a:b:1");
        lib.rules = vec![Rule::allow().on_version("(")];
        assert!(lib.validate().is_err());
    }

    #[test]
    fn test_native_classifier() {
        let mut lib = Library::new("org.lwjgl:lwjgl-platform:2.9");
        lib.natives.insert(Os::Linux, "natives-linux".into());
        lib.natives.insert(Os::Windows, "natives-windows-${arch}".into());

        assert_eq!(lib.native_classifier(&linux()).as_deref(), Some("natives-linux"));
        let win32 = Environment::new(Os::Windows, "10.0", Arch::X86);
        assert_eq!(
            lib.native_classifier(&win32).as_deref(),
            Some("natives-windows-32")
        );
        assert_eq!(lib.native_classifier(&macos("13")), None);
    }

    #[test]
    fn test_deserialize() {
        let json = r#"{
            "name": "org.lwjgl:lwjgl-platform:2.9",
            "natives": { "linux": "natives-linux", "osx": "natives-osx" },
            "extract": { "exclude": ["META-INF/"] },
            "rules": [
                { "action": "allow" },
                { "action": "disallow", "os": { "name": "osx" } }
            ]
        }"#;
        let lib: Library = serde_json::from_str(json).unwrap();
        assert_eq!(lib.natives.len(), 2);
        assert_eq!(lib.extract_excludes(), vec!["META-INF/".to_string()]);
        assert!(!lib.matches(&macos("13.0")));
        assert!(lib.matches(&linux()));
    }
}
