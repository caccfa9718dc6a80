//! Keyword matching and exclusion rules applied to scanned messages.
//!
//! Every configured term is trimmed before use and blank terms never match,
//! whether it reaches these functions directly or through [`KeywordFilter`].

use watchpost_source::SourceMessage;

fn usable_terms(terms: &[String]) -> impl Iterator<Item = &str> {
    terms.iter().map(|term| term.trim()).filter(|term| !term.is_empty())
}

/// True when `content` contains at least one keyword as a case-sensitive
/// substring.
pub fn matches(content: &str, keywords: &[String]) -> bool {
    usable_terms(keywords).any(|keyword| content.contains(keyword))
}

pub fn matched_keywords(content: &str, keywords: &[String]) -> Vec<String> {
    usable_terms(keywords)
        .filter(|keyword| content.contains(keyword))
        .map(str::to_string)
        .collect()
}

/// Content exclusion uses the same substring rule as [`matches`].
pub fn is_excluded(content: &str, exclude_keywords: &[String]) -> bool {
    matches(content, exclude_keywords)
}

/// Author-name exclusion is a bidirectional, case-insensitive partial match:
/// the name hits when it contains an excluded name or is contained in one.
/// Webhook and bot posters change their display names, hence the leniency.
pub fn is_excluded_author_name(username: &str, exclude_usernames: &[String]) -> bool {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return false;
    }
    exclude_usernames.iter().any(|excluded| {
        let excluded = excluded.trim().to_lowercase();
        !excluded.is_empty() && (username.contains(&excluded) || excluded.contains(&username))
    })
}

pub fn is_excluded_author(
    username: &str,
    author_id: &str,
    exclude_ids: &[String],
    exclude_usernames: &[String],
) -> bool {
    usable_terms(exclude_ids).any(|id| id == author_id.trim())
        || is_excluded_author_name(username, exclude_usernames)
}

/// The individual checks a scan applies to every message in its window.
pub trait MessageFilter: Send + Sync {
    fn matched_keywords(&self, content: &str) -> Vec<String>;

    fn is_excluded_author_id(&self, author_id: &str) -> bool;

    fn is_excluded_author_name(&self, username: &str) -> bool;

    fn is_excluded_content(&self, content: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    AuthorId,
    AuthorName,
    Content,
}

impl ExclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthorId => "author_id",
            Self::AuthorName => "author_name",
            Self::Content => "content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    NoMatch,
    Excluded(ExclusionReason),
    Matched { keywords: Vec<String> },
}

/// Applies keyword matching, then author-id, author-name and content
/// exclusion. The first exclusion that hits decides; later checks are not
/// consulted.
pub fn evaluate(filter: &dyn MessageFilter, message: &SourceMessage) -> FilterDecision {
    let keywords = filter.matched_keywords(&message.content);
    if keywords.is_empty() {
        return FilterDecision::NoMatch;
    }
    if filter.is_excluded_author_id(&message.author.id) {
        return FilterDecision::Excluded(ExclusionReason::AuthorId);
    }
    let global_name_hit = message
        .author
        .global_name
        .as_deref()
        .is_some_and(|name| filter.is_excluded_author_name(name));
    if filter.is_excluded_author_name(&message.author.username) || global_name_hit {
        return FilterDecision::Excluded(ExclusionReason::AuthorName);
    }
    if filter.is_excluded_content(&message.content) {
        return FilterDecision::Excluded(ExclusionReason::Content);
    }
    FilterDecision::Matched { keywords }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    exclude_keywords: Vec<String>,
    exclude_author_ids: Vec<String>,
    exclude_author_names: Vec<String>,
}

fn normalize_terms(values: Vec<String>) -> Vec<String> {
    let mut normalized = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !normalized.contains(&value) {
            normalized.push(value);
        }
    }
    normalized
}

impl KeywordFilter {
    pub fn new(
        keywords: Vec<String>,
        exclude_keywords: Vec<String>,
        exclude_author_ids: Vec<String>,
        exclude_author_names: Vec<String>,
    ) -> Self {
        Self {
            keywords: normalize_terms(keywords),
            exclude_keywords: normalize_terms(exclude_keywords),
            exclude_author_ids: normalize_terms(exclude_author_ids),
            exclude_author_names: normalize_terms(exclude_author_names),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl MessageFilter for KeywordFilter {
    fn matched_keywords(&self, content: &str) -> Vec<String> {
        matched_keywords(content, &self.keywords)
    }

    fn is_excluded_author_id(&self, author_id: &str) -> bool {
        self.exclude_author_ids.iter().any(|id| id == author_id)
    }

    fn is_excluded_author_name(&self, username: &str) -> bool {
        is_excluded_author_name(username, &self.exclude_author_names)
    }

    fn is_excluded_content(&self, content: &str) -> bool {
        is_excluded(content, &self.exclude_keywords)
    }
}
