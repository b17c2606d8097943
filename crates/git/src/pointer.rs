use std::fmt;

use serde::{Deserialize, Serialize};
use utils::text::truncate_to_char_boundary;

/// Display width for commit oids.
const SHORT_OID_LEN: usize = 10;

/// Something that names a commit.
///
/// `==` is strict structural equality. Use [`GitPointer::matches`] when an
/// [`GitPointer::Unknown`] on the left should act as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GitPointer {
    Branch(String),
    Tag(String),
    /// Always the full oid; only [`fmt::Display`] shortens it.
    Commit(String),
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Branch,
    Tag,
    Commit,
    Unknown,
}

impl PointerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerKind::Branch => "branch",
            PointerKind::Tag => "tag",
            PointerKind::Commit => "commit",
            PointerKind::Unknown => "unknown type",
        }
    }
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GitPointer {
    pub fn new(kind: PointerKind, value: impl Into<String>) -> Self {
        let value = value.into();
        match kind {
            PointerKind::Branch => GitPointer::Branch(value),
            PointerKind::Tag => GitPointer::Tag(value),
            PointerKind::Commit => GitPointer::Commit(value),
            PointerKind::Unknown => GitPointer::Unknown(value),
        }
    }

    pub fn kind(&self) -> PointerKind {
        match self {
            GitPointer::Branch(_) => PointerKind::Branch,
            GitPointer::Tag(_) => PointerKind::Tag,
            GitPointer::Commit(_) => PointerKind::Commit,
            GitPointer::Unknown(_) => PointerKind::Unknown,
        }
    }

    /// The raw, untruncated value.
    pub fn value(&self) -> &str {
        match self {
            GitPointer::Branch(v)
            | GitPointer::Tag(v)
            | GitPointer::Commit(v)
            | GitPointer::Unknown(v) => v,
        }
    }

    /// Same variant, new value.
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        GitPointer::new(self.kind(), value)
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, GitPointer::Branch(_))
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, GitPointer::Tag(_))
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, GitPointer::Commit(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, GitPointer::Unknown(_))
    }

    /// Identity comparison used by resolution and checkout.
    ///
    /// Concrete variants match only the same variant with the same value.
    /// `Unknown` on the left matches any variant carrying the same value; an
    /// `Unknown` on the right never makes a concrete left side match.
    pub fn matches(&self, other: &GitPointer) -> bool {
        match (self, other) {
            (GitPointer::Unknown(v), other) => v == other.value(),
            (GitPointer::Branch(a), GitPointer::Branch(b))
            | (GitPointer::Tag(a), GitPointer::Tag(b))
            | (GitPointer::Commit(a), GitPointer::Commit(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for GitPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            GitPointer::Commit(oid) => truncate_to_char_boundary(oid, SHORT_OID_LEN),
            other => other.value(),
        };
        write!(f, "{} `{}`", self.kind(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID_A: &str = "0123456789abcdef0123456789abcdef01234567";
    const OID_B: &str = "0123456789ffffffffffffffffffffffffffffff";

    #[test]
    fn commit_display_is_truncated_but_value_is_not() {
        let p = GitPointer::Commit(OID_A.to_string());
        assert_eq!(p.to_string(), "commit `0123456789`");
        assert_eq!(p.value(), OID_A);
    }

    #[test]
    fn commits_sharing_display_prefix_are_distinct() {
        let a = GitPointer::Commit(OID_A.to_string());
        let b = GitPointer::Commit(OID_B.to_string());
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
        assert!(!a.matches(&b));
        assert!(a.matches(&a.clone()));
    }

    #[test]
    fn unknown_matches_only_from_the_left() {
        let unknown = GitPointer::Unknown("main".into());
        let branch = GitPointer::Branch("main".into());
        assert!(unknown.matches(&branch));
        assert!(unknown.matches(&GitPointer::Tag("main".into())));
        assert!(!branch.matches(&unknown));
        assert!(!unknown.matches(&GitPointer::Branch("dev".into())));
    }

    #[test]
    fn different_variants_never_match() {
        let branch = GitPointer::Branch("v1".into());
        let tag = GitPointer::Tag("v1".into());
        assert!(!branch.matches(&tag));
        assert!(!tag.matches(&branch));
    }

    #[test]
    fn with_value_keeps_variant() {
        let p = GitPointer::Branch("main".into()).with_value("origin/main");
        assert_eq!(p, GitPointer::Branch("origin/main".into()));
        assert_eq!(p.to_string(), "branch `origin/main`");
        assert_eq!(
            GitPointer::Unknown("x".into()).to_string(),
            "unknown type `x`"
        );
    }

    #[test]
    fn serializes_as_tagged_value() {
        let json = serde_json::to_string(&GitPointer::Tag("v1.0".into())).unwrap();
        assert_eq!(json, r#"{"type":"tag","value":"v1.0"}"#);
    }
}
