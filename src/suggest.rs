//! Completion candidates, rebuilt wholesale on every schema or config
//! reload and read-only while a completion request runs.

use crate::collab::DirectiveRegistry;
use crate::collab::SyntaxInspector;

/// Keywords that may open an ad hoc statement.
const LEADING_KEYWORDS: &[&str] = &["select", "with"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Text inserted on acceptance.
    pub text: String,
    /// Text shown in the completion menu.
    pub display: String,
    pub description: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, description: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            display: text.clone(),
            text,
            description: description.into(),
        }
    }
}

/// Cursor context for one completion request. `line` is the text before
/// the cursor on the current line.
#[derive(Debug, Clone, Copy)]
pub struct CompletionContext<'a> {
    pub line: &'a str,
    pub word_before_cursor: &'a str,
    /// Whether an empty line should offer anything at all (off unless the
    /// user explicitly asked, e.g. by pressing tab on an empty prompt).
    pub complete_on_empty: bool,
}

/// Derived mapping from completion context to candidates. A pure function
/// of the directive names, named-query names and foreign table names it
/// was rebuilt from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionIndex {
    directives: Vec<Suggestion>,
    named_queries: Vec<Suggestion>,
    tables: Vec<Suggestion>,
}

impl SuggestionIndex {
    pub fn rebuild(directives: Vec<Suggestion>, named_queries: &[String], tables: &[String]) -> Self {
        let mut named_queries: Vec<Suggestion> = named_queries
            .iter()
            .map(|name| Suggestion::new(name.clone(), "named query"))
            .collect();
        named_queries.sort_by(|a, b| a.text.cmp(&b.text));
        let mut tables: Vec<Suggestion> = tables
            .iter()
            .map(|name| Suggestion::new(name.clone(), "table"))
            .collect();
        tables.sort_by(|a, b| a.text.cmp(&b.text));
        Self {
            directives,
            named_queries,
            tables,
        }
    }

    pub fn tables(&self) -> &[Suggestion] {
        &self.tables
    }

    pub fn complete(
        &self,
        ctx: CompletionContext<'_>,
        directives: &dyn DirectiveRegistry,
        syntax: &dyn SyntaxInspector,
    ) -> Vec<Suggestion> {
        let text = ctx.line.trim_start().to_lowercase();
        if text.is_empty() && !ctx.complete_on_empty {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        if is_first_word(&text) {
            candidates.extend(self.named_queries.iter().cloned());
            candidates.extend(
                LEADING_KEYWORDS
                    .iter()
                    .map(|keyword| Suggestion::new(*keyword, "keyword")),
            );
            candidates.extend(self.directives.iter().cloned());
        } else if directives.is_directive(&text) {
            candidates = directives.complete(&text, &self.tables);
        } else if syntax.expects_table(&text) {
            candidates.extend(self.tables.iter().cloned());
        }

        filter_has_prefix(candidates, ctx.word_before_cursor)
    }
}

fn is_first_word(text: &str) -> bool {
    !text.contains(char::is_whitespace)
}

/// Case-insensitive prefix filter against the word under the cursor.
fn filter_has_prefix(candidates: Vec<Suggestion>, word: &str) -> Vec<Suggestion> {
    if word.is_empty() {
        return candidates;
    }
    let word = word.to_lowercase();
    candidates
        .into_iter()
        .filter(|candidate| candidate.text.to_lowercase().starts_with(&word))
        .collect()
}
