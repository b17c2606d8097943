//! Git version parsing and comparison.
//!
//! Local versions come from `git --version`. Remote versions come from the
//! `agent=git/<version>` capability a server advertises during protocol v2
//! negotiation, which `GIT_TRACE_PACKET` exposes on stderr.

use std::{cmp::Ordering, fmt, sync::LazyLock};

use regex::Regex;

/// Local git must be at least this new to clone with `--filter`.
pub const MIN_LOCAL_FILTER_VERSION: GitVersion = GitVersion::new(2, 36, 1);
/// Remote must be at least this new to serve filtered packs.
pub const MIN_REMOTE_FILTER_VERSION: GitVersion = GitVersion::new(2, 27, 0);

/// Prefix of GitHub's advertised agent; trusted without a numeric check.
const GITHUB_AGENT_PREFIX: &str = "github";

static AGENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Only server-sent packets ("git<"); the client advertises its own agent too.
    Regex::new(r"git<\s+agent=git/(\S+)").expect("valid agent regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GitVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl GitVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading numeric components of a version string.
    ///
    /// `2.39.3.windows.1` and `2.43.0-rc1` both parse; missing components are zero.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('.').map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        });
        let major = parts.next().flatten()?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    /// Parse `git --version` output, e.g. `git version 2.39.3 (Apple Git-146)`.
    pub fn from_version_output(output: &str) -> Option<Self> {
        let rest = output.trim().strip_prefix("git version ")?;
        Self::parse(rest.split_whitespace().next()?)
    }
}

impl Ord for GitVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for GitVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What a remote server says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteVersion {
    Numeric(GitVersion),
    Github(String),
    Other(String),
}

impl RemoteVersion {
    pub fn parse(agent: &str) -> Self {
        if agent.starts_with(GITHUB_AGENT_PREFIX) {
            RemoteVersion::Github(agent.to_string())
        } else if let Some(v) = GitVersion::parse(agent) {
            RemoteVersion::Numeric(v)
        } else {
            RemoteVersion::Other(agent.to_string())
        }
    }

    /// Extract the server agent from `GIT_TRACE_PACKET` output.
    pub fn from_packet_trace(trace: &str) -> Option<Self> {
        AGENT_RE
            .captures(trace)
            .and_then(|c| c.get(1))
            .map(|m| Self::parse(m.as_str()))
    }

    pub fn supports_filter(&self) -> bool {
        match self {
            RemoteVersion::Numeric(v) => *v >= MIN_REMOTE_FILTER_VERSION,
            RemoteVersion::Github(agent) => {
                // No lower bound is known for GitHub's agent string.
                tracing::warn!("Trusting remote agent `{agent}` for filtered clone");
                true
            }
            RemoteVersion::Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vendor_suffixed_versions() {
        assert_eq!(
            GitVersion::parse("2.39.3.windows.1"),
            Some(GitVersion::new(2, 39, 3))
        );
        assert_eq!(GitVersion::parse("2.43.0-rc1"), Some(GitVersion::new(2, 43, 0)));
        assert_eq!(GitVersion::parse("2"), Some(GitVersion::new(2, 0, 0)));
        assert_eq!(GitVersion::parse("abc"), None);
    }

    #[test]
    fn parses_cli_version_output() {
        assert_eq!(
            GitVersion::from_version_output("git version 2.39.3 (Apple Git-146)\n"),
            Some(GitVersion::new(2, 39, 3))
        );
        assert_eq!(GitVersion::from_version_output("hub version 2.14"), None);
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(GitVersion::new(2, 36, 10) > GitVersion::new(2, 36, 9));
        assert!(GitVersion::new(2, 100, 0) > GitVersion::new(2, 36, 1));
        assert!(GitVersion::new(2, 36, 0) < MIN_LOCAL_FILTER_VERSION);
        assert!(GitVersion::new(2, 36, 1) >= MIN_LOCAL_FILTER_VERSION);
    }

    #[test]
    fn extracts_server_agent_from_trace() {
        let trace = "\
12:00:00.000000 pkt-line.c:80           packet:          git> agent=git/2.30.0
12:00:00.000001 pkt-line.c:80           packet:          git< version 2
12:00:00.000002 pkt-line.c:80           packet:          git< agent=git/2.41.0
";
        assert_eq!(
            RemoteVersion::from_packet_trace(trace),
            Some(RemoteVersion::Numeric(GitVersion::new(2, 41, 0)))
        );
    }

    #[test]
    fn github_agent_is_trusted() {
        let v = RemoteVersion::parse("github-g2b0bbb4e2d");
        assert!(matches!(v, RemoteVersion::Github(_)));
        assert!(v.supports_filter());
    }

    #[test]
    fn remote_threshold_is_inclusive() {
        assert!(RemoteVersion::parse("2.27.0").supports_filter());
        assert!(!RemoteVersion::parse("2.26.9").supports_filter());
        assert!(!RemoteVersion::parse("jgit").supports_filter());
    }
}
