//! Edit engine: one model call per `propose`, strict response parsing.
//!
//! The model answers in a block format:
//!
//! ```text
//! --- FILE: src/App.tsx ---
//! <complete new file content>
//! --- END FILE ---
//! --- DELETE: src/old.css ---
//! ```
//!
//! or with the sentinel `NO_CHANGES_NEEDED`, alone or inside a line of prose.
//! Text between blocks is ignored. Any structural problem rejects the whole
//! response.
//!
//! Blocks may only target files from the supplied context, except protected
//! paths: those pass through so the change validator can reject the batch.

use std::collections::HashSet;
use std::sync::Arc;

use propagator_llm::{
    CompletionRequest, ModelProvider, ProviderError, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};
use tracing::{debug, instrument};

use crate::context::EditContext;
use crate::domain::edit::ProposedEdit;
use crate::domain::error::EditParseError;
use crate::validator::ChangeValidator;
use crate::workspace::normalize_relative_path;

/// Sentinel the model uses to decline making changes.
pub const NO_CHANGES_SENTINEL: &str = "NO_CHANGES_NEEDED";

const FILE_OPEN: &str = "--- FILE: ";
const DELETE_OPEN: &str = "--- DELETE: ";
const BLOCK_CLOSE: &str = "--- END FILE ---";
const MARKER_TAIL: &str = " ---";

const SYSTEM_PROMPT: &str = "You update website codebases so they conform to a shared \
specification document. You only answer in the requested file block format.";

/// Why `propose` failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Parse(#[from] EditParseError),
}

impl EditError {
    /// Only provider errors classified as transient are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EditError::Provider(err) => err.is_transient(),
            EditError::Parse(_) => false,
        }
    }
}

impl From<EditError> for crate::domain::error::PropagatorError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Provider(e) => e.into(),
            EditError::Parse(e) => e.into(),
        }
    }
}

/// Model settings for edit passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEngineConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for EditEngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Turns an [`EditContext`] into a list of [`ProposedEdit`]s.
#[derive(Clone)]
pub struct EditEngine {
    provider: Arc<dyn ModelProvider>,
    config: EditEngineConfig,
}

impl std::fmt::Debug for EditEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditEngine")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

impl EditEngine {
    pub fn new(provider: Arc<dyn ModelProvider>, config: EditEngineConfig) -> Self {
        Self { provider, config }
    }

    /// Invoke the model exactly once and parse its answer.
    ///
    /// Has no side effects outside the provider call, so calling it again
    /// with the same context after a transient failure is safe.
    #[instrument(skip(self, context, validator), fields(provider = self.provider.name(), files = context.files.len()))]
    pub async fn propose(
        &self,
        context: &EditContext,
        validator: &ChangeValidator,
    ) -> Result<Vec<ProposedEdit>, EditError> {
        let request = CompletionRequest::new(
            self.config.model.clone(),
            self.config.max_tokens,
            render_prompt(context),
        )
        .with_system(SYSTEM_PROMPT);

        let completion = self.provider.complete(&request).await?;
        let edits = parse_response(&completion.text, context, |path| {
            validator.protected_by(path).is_some()
        })?;
        debug!(edits = edits.len(), "Parsed model response");
        Ok(edits)
    }
}

/// Render the user prompt for one site.
pub fn render_prompt(context: &EditContext) -> String {
    let mut files = String::new();
    for file in &context.files {
        files.push_str(&format!("=== {} ===\n{}\n\n", file.path, file.content));
    }

    format!(
        "You are updating a website codebase based on a specification document.\n\n\
## Site Name: {site}\n\n\
## Specification:\n{spec}\n\n\
## Current Site Code:\n{files}\
## Your Task:\n\
1. Review the current code structure and understand what exists\n\
2. Compare it against the specification\n\
3. Make the updates needed to align the site with the specification\n\
4. Preserve site-specific content (names, contact info, images)\n\n\
## Output Format:\n\
For each file that needs changes, output:\n\n\
{open}path/to/file.tsx{tail}\n\
[complete file content]\n\
{close}\n\n\
To delete a file, output:\n\n\
{delete}path/to/file.css{tail}\n\n\
Rules:\n\
- Only touch files listed under Current Site Code\n\
- Include the COMPLETE file content, never a partial patch\n\
- Keep existing styling patterns, imports and conventions\n\
- Do not output files that need no change\n\n\
If no changes are needed, respond with exactly: {sentinel}",
        site = context.site_name,
        spec = context.specification,
        files = files,
        open = FILE_OPEN,
        delete = DELETE_OPEN,
        tail = MARKER_TAIL,
        close = BLOCK_CLOSE,
        sentinel = NO_CHANGES_SENTINEL,
    )
}

fn marker_path<'a>(line: &'a str, open: &str) -> Option<&'a str> {
    line.trim_end()
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(MARKER_TAIL))
}

fn is_marker_like(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("--- FILE:")
        || trimmed.starts_with("--- DELETE:")
        || trimmed.starts_with("--- END FILE")
}

/// Parse a model response against the context it was produced from.
///
/// Returns an empty list for the no-changes sentinel or a blank response.
/// Paths outside the context are rejected unless `is_protected` holds.
pub fn parse_response(
    response: &str,
    context: &EditContext,
    is_protected: impl Fn(&str) -> bool,
) -> Result<Vec<ProposedEdit>, EditParseError> {
    let mut edits: Vec<ProposedEdit> = Vec::new();
    let mut seen = HashSet::new();
    let mut saw_sentinel = false;
    let mut saw_prose = false;

    let mut open: Option<(String, String)> = None;

    for (idx, line) in response.split_inclusive('\n').enumerate() {
        if let Some((path, content)) = open.as_mut() {
            if line.trim_end() == BLOCK_CLOSE {
                if content.trim().is_empty() {
                    return Err(EditParseError::EmptyReplacement { path: path.clone() });
                }
                edits.push(ProposedEdit::replace(path.clone(), std::mem::take(content)));
                open = None;
            } else {
                content.push_str(line);
            }
            continue;
        }

        if let Some(raw) = marker_path(line, FILE_OPEN) {
            let path = checked_path(raw, context, &is_protected, &mut seen)?;
            open = Some((path, String::new()));
        } else if let Some(raw) = marker_path(line, DELETE_OPEN) {
            let path = checked_path(raw, context, &is_protected, &mut seen)?;
            edits.push(ProposedEdit::delete(path));
        } else if is_marker_like(line) {
            return Err(EditParseError::StrayMarker {
                line: idx + 1,
                text: line.trim().to_string(),
            });
        } else if line.contains(NO_CHANGES_SENTINEL) {
            saw_sentinel = true;
        } else if !line.trim().is_empty() {
            saw_prose = true;
        }
    }

    if let Some((path, _)) = open {
        return Err(EditParseError::UnterminatedBlock { path });
    }
    if saw_sentinel && !edits.is_empty() {
        return Err(EditParseError::AmbiguousNoChanges);
    }
    if edits.is_empty() && !saw_sentinel && saw_prose {
        return Err(EditParseError::NoEditBlocks);
    }

    Ok(edits)
}

fn checked_path(
    raw: &str,
    context: &EditContext,
    is_protected: &impl Fn(&str) -> bool,
    seen: &mut HashSet<String>,
) -> Result<String, EditParseError> {
    if raw.trim().is_empty() {
        return Err(EditParseError::EmptyPath);
    }
    let path = normalize_relative_path(raw).map_err(|reason| EditParseError::InvalidPath {
        path: raw.trim().to_string(),
        reason,
    })?;
    if !context.contains(&path) && !is_protected(&path) {
        return Err(EditParseError::OutsideContext { path });
    }
    if !seen.insert(path.clone()) {
        return Err(EditParseError::DuplicatePath { path });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFile;
    use crate::domain::edit::EditAction;
    use crate::validator::ValidationPolicy;
    use propagator_llm::fakes::ScriptedProvider;

    fn validator() -> ChangeValidator {
        ChangeValidator::new(ValidationPolicy::default()).unwrap()
    }

    fn parse(response: &str) -> Result<Vec<ProposedEdit>, EditParseError> {
        let validator = validator();
        parse_response(response, &context(), |p| validator.protected_by(p).is_some())
    }

    fn context() -> EditContext {
        EditContext {
            site_name: "Acme".into(),
            specification: "Add an analytics script tag.".into(),
            files: vec![
                ContextFile {
                    path: "index.html".into(),
                    content: "<html><head></head></html>\n".into(),
                },
                ContextFile {
                    path: "src/old.css".into(),
                    content: "body {}\n".into(),
                },
            ],
            omitted: vec![],
        }
    }

    #[test]
    fn test_parses_replace_and_delete() {
        let response = "Here you go.\n\
--- FILE: index.html ---\n\
<html><head><script src=\"a.js\"></script></head></html>\n\
--- END FILE ---\n\
--- DELETE: src/old.css ---\n";
        let edits = parse(response).unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].path, "index.html");
        assert_eq!(
            edits[0].action,
            EditAction::Replace {
                content: "<html><head><script src=\"a.js\"></script></head></html>\n".into()
            }
        );
        assert!(edits[1].is_delete());
    }

    #[test]
    fn test_content_is_kept_verbatim() {
        let response = "--- FILE: index.html ---\n  indented\n\n--- not a marker\n--- END FILE ---\n";
        let edits = parse(response).unwrap();
        assert_eq!(
            edits[0].new_content(),
            Some("  indented\n\n--- not a marker\n")
        );
    }

    #[test]
    fn test_sentinel_and_blank_mean_no_edits() {
        assert!(parse("NO_CHANGES_NEEDED").unwrap().is_empty());
        assert!(parse("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_sentinel_inside_prose_means_no_edits() {
        assert!(parse("The site already conforms. NO_CHANGES_NEEDED")
            .unwrap()
            .is_empty());
        assert!(parse("Nothing to do.\n\n`NO_CHANGES_NEEDED`\n")
            .unwrap()
            .is_empty());
        assert_eq!(
            parse("Done. NO_CHANGES_NEEDED\n--- DELETE: src/old.css ---\n"),
            Err(EditParseError::AmbiguousNoChanges)
        );
    }

    #[test]
    fn test_rejects_outside_context() {
        let response = "--- FILE: src/extra.ts ---\nexport {};\n--- END FILE ---\n";
        assert_eq!(
            parse(response),
            Err(EditParseError::OutsideContext {
                path: "src/extra.ts".into()
            })
        );
    }

    #[test]
    fn test_protected_paths_outside_context_pass_through() {
        let response = "--- FILE: .env ---\nSECRET=1\n--- END FILE ---\n\
--- DELETE: .github/workflows/deploy.yml ---\n";
        let edits = parse(response).unwrap();
        let paths: Vec<_> = edits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![".env", ".github/workflows/deploy.yml"]);

        let strict = parse_response(response, &context(), |_| false);
        assert!(matches!(strict, Err(EditParseError::OutsideContext { .. })));
    }

    #[test]
    fn test_rejects_unterminated_block() {
        let response = "--- FILE: index.html ---\n<html>\n";
        assert!(matches!(
            parse(response),
            Err(EditParseError::UnterminatedBlock { .. })
        ));
    }

    #[test]
    fn test_rejects_whole_batch_on_one_bad_block() {
        let response = "--- FILE: index.html ---\nok\n--- END FILE ---\n\
--- FILE: ../escape.html ---\nbad\n--- END FILE ---\n";
        assert!(matches!(
            parse(response),
            Err(EditParseError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_mixed_sentinel() {
        let dup = "--- FILE: index.html ---\na\n--- END FILE ---\n--- DELETE: index.html ---\n";
        assert_eq!(
            parse(dup),
            Err(EditParseError::DuplicatePath {
                path: "index.html".into()
            })
        );

        let mixed = "NO_CHANGES_NEEDED\n--- FILE: index.html ---\na\n--- END FILE ---\n";
        assert_eq!(
            parse(mixed),
            Err(EditParseError::AmbiguousNoChanges)
        );
    }

    #[test]
    fn test_rejects_stray_close_and_prose_only() {
        assert!(matches!(
            parse("--- END FILE ---\n"),
            Err(EditParseError::StrayMarker { line: 1, .. })
        ));
        assert_eq!(
            parse("I think the site looks fine."),
            Err(EditParseError::NoEditBlocks)
        );
    }

    #[test]
    fn test_rejects_empty_replacement_and_path() {
        assert!(matches!(
            parse("--- FILE: index.html ---\n\n--- END FILE ---\n"),
            Err(EditParseError::EmptyReplacement { .. })
        ));
        assert_eq!(
            parse("--- FILE:  ---\n"),
            Err(EditParseError::EmptyPath)
        );
    }

    #[test]
    fn test_prompt_carries_spec_and_files() {
        let prompt = render_prompt(&context());
        assert!(prompt.contains("Add an analytics script tag."));
        assert!(prompt.contains("=== index.html ==="));
        assert!(prompt.contains("## Site Name: Acme"));
        assert!(prompt.contains(NO_CHANGES_SENTINEL));
    }

    #[tokio::test]
    async fn test_propose_calls_provider_once() {
        let provider = Arc::new(ScriptedProvider::always(
            "--- FILE: index.html ---\n<html>new</html>\n--- END FILE ---\n",
        ));
        let engine = EditEngine::new(provider.clone(), EditEngineConfig::default());

        let edits = engine.propose(&context(), &validator()).await.unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(provider.call_count(), 1);

        let request = &provider.requests()[0];
        assert_eq!(request.model, DEFAULT_MODEL);
        assert!(request.system.is_some());
    }

    #[tokio::test]
    async fn test_propose_surfaces_classified_errors() {
        let engine = EditEngine::new(
            Arc::new(ScriptedProvider::always_failing(ProviderError::RateLimited {
                retry_after_secs: None,
            })),
            EditEngineConfig::default(),
        );
        let err = engine.propose(&context(), &validator()).await.unwrap_err();
        assert!(err.is_transient());

        let engine = EditEngine::new(
            Arc::new(ScriptedProvider::always("prose only")),
            EditEngineConfig::default(),
        );
        let err = engine.propose(&context(), &validator()).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, EditError::Parse(EditParseError::NoEditBlocks)));
    }
}
