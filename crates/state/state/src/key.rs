use serde::{Deserialize, Serialize};

/// The kind of record being stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Document catalog record, keyed by document id.
    Document,
    /// Secondary index from owner actor to document.
    OwnerIndex,
    /// Secondary index from `(context kind, ref id)` to document.
    ContextIndex,
    /// Download token record, keyed by token digest.
    DownloadToken,
    /// Secondary index from document to token digest.
    TokenDocumentIndex,
    Custom(String),
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "document",
            Self::OwnerIndex => "owner_index",
            Self::ContextIndex => "context_index",
            Self::DownloadToken => "download_token",
            Self::TokenDocumentIndex => "token_document_index",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Inverse of [`as_str`](Self::as_str). Unknown names become `Custom`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "document" => Self::Document,
            "owner_index" => Self::OwnerIndex,
            "context_index" => Self::ContextIndex,
            "download_token" => Self::DownloadToken,
            "token_document_index" => Self::TokenDocumentIndex,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address entries in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    /// Create a new state key.
    #[must_use]
    pub fn new(kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Build a key whose id is several components joined with `:`.
    ///
    /// Components are escaped so that a component containing `:` can never
    /// collide with a differently split key.
    #[must_use]
    pub fn compound(kind: KeyKind, parts: &[&str]) -> Self {
        let id = parts
            .iter()
            .map(|p| escape_component(p))
            .collect::<Vec<_>>()
            .join(":");
        Self { kind, id }
    }

    /// The id prefix matching every compound key that starts with `parts`.
    #[must_use]
    pub fn compound_prefix(parts: &[&str]) -> String {
        let mut prefix = String::new();
        for part in parts {
            prefix.push_str(&escape_component(part));
            prefix.push(':');
        }
        prefix
    }

    /// Return a canonical string representation: `kind:id`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn escape_component(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_names_round_trip() {
        for kind in [
            KeyKind::Document,
            KeyKind::OwnerIndex,
            KeyKind::ContextIndex,
            KeyKind::DownloadToken,
            KeyKind::TokenDocumentIndex,
            KeyKind::Custom("foo".into()),
        ] {
            assert_eq!(KeyKind::from_name(kind.as_str()), kind);
        }
    }

    #[test]
    fn state_key_canonical() {
        let key = StateKey::new(KeyKind::Document, "abc");
        assert_eq!(key.canonical(), "document:abc");
    }

    #[test]
    fn compound_keys_escape_separators() {
        let a = StateKey::compound(KeyKind::OwnerIndex, &["a:b", "c"]);
        let b = StateKey::compound(KeyKind::OwnerIndex, &["a", "b:c"]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, "a%3Ab:c");
        assert!(a.id.starts_with(&StateKey::compound_prefix(&["a:b"])));
        assert!(!b.id.starts_with(&StateKey::compound_prefix(&["a:b"])));
    }

    #[test]
    fn prefix_does_not_match_longer_owner() {
        let key = StateKey::compound(KeyKind::OwnerIndex, &["alice2", "doc-1"]);
        assert!(!key.id.starts_with(&StateKey::compound_prefix(&["alice"])));
    }
}
