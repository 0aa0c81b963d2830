//! Change validator: advises whether a proposed edit set may be published.
//!
//! Rules are evaluated over the whole set and every violation is reported.
//! A failed verdict skips the site; it never results in a partial apply.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::edit::{EditAction, ProposedEdit};
use crate::domain::error::{PropagatorError, Result};
use crate::workspace::Workspace;

/// Why a path is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectedKind {
    Secret,
    LockFile,
    CiCredentials,
}

/// A glob over workspace-relative paths.
///
/// `*` matches within one path segment and `**` across segments. A pattern
/// without `/` is matched against the file name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    pub pattern: String,
    pub kind: ProtectedKind,
}

impl DenyRule {
    pub fn new(pattern: impl Into<String>, kind: ProtectedKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }
}

/// Deny-list and checks applied to every edit set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub deny: Vec<DenyRule>,
    /// Parse `.json` replacements before accepting them.
    pub check_json_syntax: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        use ProtectedKind::*;
        let rule = DenyRule::new;
        Self {
            deny: vec![
                rule(".env", Secret),
                rule(".env.*", Secret),
                rule("*.pem", Secret),
                rule("*.key", Secret),
                rule("*.p12", Secret),
                rule("id_rsa*", Secret),
                rule(".npmrc", Secret),
                rule(".netrc", Secret),
                rule("package-lock.json", LockFile),
                rule("yarn.lock", LockFile),
                rule("pnpm-lock.yaml", LockFile),
                rule("bun.lockb", LockFile),
                rule("Cargo.lock", LockFile),
                rule("Gemfile.lock", LockFile),
                rule("poetry.lock", LockFile),
                rule("composer.lock", LockFile),
                rule(".github/workflows/**", CiCredentials),
                rule(".circleci/**", CiCredentials),
                rule(".gitlab-ci.yml", CiCredentials),
            ],
            check_json_syntax: true,
        }
    }
}

/// One reason an edit set was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    /// The model declined or produced nothing.
    EmptyEditSet,
    DeniedPath {
        path: String,
        pattern: String,
        kind: ProtectedKind,
    },
    Malformed {
        path: String,
        detail: String,
    },
    /// Every edit leaves the repository as it already is.
    NoEffectiveChange,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::EmptyEditSet => write!(f, "model proposed no edits"),
            Violation::DeniedPath { path, pattern, .. } => {
                write!(f, "{path} is protected (matches {pattern})")
            }
            Violation::Malformed { path, detail } => write!(f, "{path} is malformed: {detail}"),
            Violation::NoEffectiveChange => write!(f, "edits do not change any file"),
        }
    }
}

/// Validator verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationVerdict {
    /// All violations joined for a report line.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: DenyRule,
    regex: Regex,
    name_only: bool,
}

/// Evaluates edit sets against a [`ValidationPolicy`].
#[derive(Debug, Clone)]
pub struct ChangeValidator {
    rules: Vec<CompiledRule>,
    check_json_syntax: bool,
}

impl ChangeValidator {
    pub fn new(policy: ValidationPolicy) -> Result<Self> {
        let rules = policy
            .deny
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(&glob_to_regex(&rule.pattern)).map_err(|e| {
                    PropagatorError::Configuration(format!(
                        "invalid deny pattern {}: {e}",
                        rule.pattern
                    ))
                })?;
                Ok(CompiledRule {
                    name_only: !rule.pattern.contains('/'),
                    rule,
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            check_json_syntax: policy.check_json_syntax,
        })
    }

    /// The first deny rule matching `path`, if any.
    pub fn protected_by(&self, path: &str) -> Option<&DenyRule> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.rules
            .iter()
            .find(|c| {
                let subject = if c.name_only { file_name } else { path };
                c.regex.is_match(subject)
            })
            .map(|c| &c.rule)
    }

    /// Validate `edits` against the current contents of `workspace`.
    pub fn validate(&self, workspace: &Workspace, edits: &[ProposedEdit]) -> ValidationVerdict {
        self.validate_against(edits, |path| workspace.read_file(path).ok().flatten())
    }

    /// Validate `edits` given a lookup of current file contents.
    pub fn validate_against(
        &self,
        edits: &[ProposedEdit],
        current: impl Fn(&str) -> Option<String>,
    ) -> ValidationVerdict {
        let mut violations = Vec::new();

        if edits.is_empty() {
            violations.push(Violation::EmptyEditSet);
        }

        let mut any_effective = false;
        for edit in edits {
            if let Some(rule) = self.protected_by(&edit.path) {
                violations.push(Violation::DeniedPath {
                    path: edit.path.clone(),
                    pattern: rule.pattern.clone(),
                    kind: rule.kind,
                });
            }

            if let EditAction::Replace { content } = &edit.action {
                if self.check_json_syntax && edit.path.ends_with(".json") {
                    if let Err(e) = serde_json::from_str::<serde_json::Value>(content) {
                        violations.push(Violation::Malformed {
                            path: edit.path.clone(),
                            detail: e.to_string(),
                        });
                    }
                }
            }

            let existing = current(&edit.path);
            let changes = match (&edit.action, existing) {
                (EditAction::Replace { content }, Some(old)) => *content != old,
                (EditAction::Replace { .. }, None) => true,
                (EditAction::Delete, existing) => existing.is_some(),
            };
            any_effective |= changes;
        }

        if !edits.is_empty() && !any_effective {
            violations.push(Violation::NoEffectiveChange);
        }

        ValidationVerdict {
            passed: violations.is_empty(),
            violations,
        }
    }
}

/// Translate a path glob to an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
