//! Operations and operation-kind detection

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::graphql::GraphQLRequest;
use crate::errors::TransportError;

/// Discriminator that decides which wire path an operation takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Detect the kind of the first executable definition in a document.
    ///
    /// Comments, whitespace and fragment definitions are skipped. A bare
    /// selection set (`{ ... }`) is a query. Returns `None` when no
    /// operation definition can be found.
    pub fn detect(document: &str) -> Option<Self> {
        let mut rest = document;
        loop {
            rest = skip_ignored(rest);
            if rest.starts_with('{') {
                return Some(Self::Query);
            }
            let word_len =
                rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
            if word_len == 0 {
                return None;
            }
            match &rest[..word_len] {
                "query" => return Some(Self::Query),
                "mutation" => return Some(Self::Mutation),
                "subscription" => return Some(Self::Subscription),
                "fragment" => rest = skip_definition(&rest[word_len..])?,
                _ => return None,
            }
        }
    }

    /// True for the kinds served over request/response HTTP
    pub fn is_request_response(self) -> bool {
        !matches!(self, Self::Subscription)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// Skip whitespace, commas (insignificant in GraphQL) and `#` comments
fn skip_ignored(mut input: &str) -> &str {
    loop {
        input = input.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '\u{feff}');
        match input.strip_prefix('#') {
            Some(comment) => input = comment.find('\n').map_or("", |idx| &comment[idx..]),
            None => return input,
        }
    }
}

/// Skip past the balanced selection set that ends a fragment definition
fn skip_definition(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in input[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start + idx + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}

/// One request description created by a caller and consumed exactly once by
/// the chosen transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub request: GraphQLRequest,
}

impl Operation {
    pub fn new(kind: OperationKind, request: GraphQLRequest) -> Self {
        Self { id: Uuid::new_v4(), kind, request }
    }

    pub fn query(request: GraphQLRequest) -> Self {
        Self::new(OperationKind::Query, request)
    }

    pub fn mutation(request: GraphQLRequest) -> Self {
        Self::new(OperationKind::Mutation, request)
    }

    pub fn subscription(request: GraphQLRequest) -> Self {
        Self::new(OperationKind::Subscription, request)
    }

    /// Build an operation whose kind is read from the document itself
    ///
    /// # Errors
    /// Returns `TransportError::Client` when the document has no detectable
    /// operation definition.
    pub fn from_document(request: GraphQLRequest) -> Result<Self, TransportError> {
        let kind = OperationKind::detect(&request.query).ok_or_else(|| {
            TransportError::Client("document contains no operation definition".to_string())
        })?;
        Ok(Self::new(kind, request))
    }

    /// Operation name for logging; falls back to the kind
    pub fn display_name(&self) -> String {
        self.request.operation_name.clone().unwrap_or_else(|| format!("anonymous {}", self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_named_operations() {
        assert_eq!(OperationKind::detect("query Me { me { id } }"), Some(OperationKind::Query));
        assert_eq!(
            OperationKind::detect("mutation Login($e: String!) { login(email: $e) { ok } }"),
            Some(OperationKind::Mutation)
        );
        assert_eq!(
            OperationKind::detect("subscription { toolsUpdated { id } }"),
            Some(OperationKind::Subscription)
        );
    }

    #[test]
    fn test_shorthand_query() {
        assert_eq!(OperationKind::detect("  { workspaces { id } }"), Some(OperationKind::Query));
    }

    #[test]
    fn test_skips_comments_and_fragments() {
        let document = r#"
            # leading comment with query keyword
            fragment AgentFields on Agent {
                id
                name(format: "{x}")
                nested { deep { id } }
            }
            subscription AgentsChanged { agents { ...AgentFields } }
        "#;
        assert_eq!(OperationKind::detect(document), Some(OperationKind::Subscription));
    }

    #[test]
    fn test_undetectable_documents() {
        assert_eq!(OperationKind::detect(""), None);
        assert_eq!(OperationKind::detect("# only a comment"), None);
        assert_eq!(OperationKind::detect("type Query { id: ID }"), None);
        assert_eq!(OperationKind::detect("fragment F on T { id"), None);

        let err = Operation::from_document(GraphQLRequest::new("scalar Date")).unwrap_err();
        assert!(matches!(err, TransportError::Client(_)));
    }

    #[test]
    fn test_from_document_sets_kind() {
        let op = Operation::from_document(GraphQLRequest::new("mutation { logout }")).unwrap();
        assert_eq!(op.kind, OperationKind::Mutation);
        assert!(op.kind.is_request_response());
        assert!(!OperationKind::Subscription.is_request_response());
        assert_eq!(op.display_name(), "anonymous mutation");
    }
}
