//! Lightweight tags.

use std::{cmp::Ordering, collections::BTreeMap};

use utils::log::traced;

use crate::{
    RepoError, pointer::GitPointer, repo::GitRepo, validation::ensure_tag_name,
};

impl GitRepo {
    /// Tag name to the commit it peels to.
    pub fn tags(&self) -> Result<BTreeMap<String, String>, RepoError> {
        Ok(self
            .backend()
            .tags()?
            .into_iter()
            .map(|t| (t.name, t.oid))
            .collect())
    }

    /// The highest version-like tag (leading digit or `v`), compared with
    /// digit runs as numbers so `v1.10` beats `v1.9`.
    pub fn max_version_tag(&self) -> Result<Option<(String, String)>, RepoError> {
        Ok(self
            .tags()?
            .into_iter()
            .filter(|(name, _)| {
                name.starts_with('v') || name.chars().next().is_some_and(|c| c.is_ascii_digit())
            })
            .max_by(|(a, _), (b, _)| {
                compare_numeric(
                    a.strip_prefix('v').unwrap_or(a),
                    b.strip_prefix('v').unwrap_or(b),
                )
            }))
    }

    /// Tag `base` (HEAD when `None`) as `name`.
    pub fn create_tag(
        &self,
        name: &str,
        base: Option<&GitPointer>,
        force: bool,
    ) -> Result<(), RepoError> {
        ensure_tag_name(name)?;
        let description = format!(
            "Create a tag `{name}` based on {} (force: {force})",
            base.map(ToString::to_string)
                .unwrap_or_else(|| "HEAD".to_string())
        );
        traced(description, || {
            let oid = match base {
                Some(base) => self.commit_for(base)?,
                None => self.commit_for(&GitPointer::Unknown("HEAD".to_string()))?,
            };
            self.backend().create_tag(name, &oid, force)
        })
    }

    /// First tag, by name, pointing at `commit` (full or abbreviated).
    pub fn tag_for(&self, commit: &str) -> Result<Option<String>, RepoError> {
        let Some(oid) = self.backend().resolve_commit(commit)? else {
            return Err(RepoError::InvalidArgument(format!("Invalid commit `{commit}`")));
        };
        Ok(self
            .backend()
            .tags()?
            .into_iter()
            .find(|t| t.oid == oid)
            .map(|t| t.name))
    }
}

/// Compare with runs of ASCII digits ordered by value.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let take_run = |it: &mut std::iter::Peekable<std::str::Chars<'_>>| {
                    let mut run = String::new();
                    while let Some(c) = it.next_if(|c| c.is_ascii_digit()) {
                        run.push(c);
                    }
                    run
                };
                let (ra, rb) = (take_run(&mut a), take_run(&mut b));
                let (ta, tb) = (ra.trim_start_matches('0'), rb.trim_start_matches('0'));
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(compare_numeric("1.10.0", "1.9.3"), Ordering::Greater);
        assert_eq!(compare_numeric("2.0", "2.0"), Ordering::Equal);
        assert_eq!(compare_numeric("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_numeric("1.02", "1.2"), Ordering::Equal);
        assert_eq!(compare_numeric("1.0-beta", "1.0-alpha"), Ordering::Greater);
    }
}
