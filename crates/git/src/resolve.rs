//! Name-to-pointer resolution across local and remote scopes.

use crate::{
    RepoError,
    backend::{ObjectInfo, RefKind},
    pointer::GitPointer,
    repo::GitRepo,
};

/// Where [`GitRepo::resolve`] may look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveScope {
    pub local: bool,
    pub remote: bool,
}

impl ResolveScope {
    pub const ALL: Self = Self {
        local: true,
        remote: true,
    };
    pub const LOCAL: Self = Self {
        local: true,
        remote: false,
    };
    pub const REMOTE: Self = Self {
        local: false,
        remote: true,
    };
}

impl Default for ResolveScope {
    fn default() -> Self {
        Self::ALL
    }
}

/// A pointer that exists, with the commit it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Remote-scoped branches carry the remote prefix, e.g. `Branch("origin/main")`.
    pub pointer: GitPointer,
    pub is_local: bool,
    /// Set when the branch was found under a configured remote.
    pub remote: Option<String>,
    /// Full oid of the commit the pointer resolves to.
    pub oid: String,
}

impl Resolution {
    /// The pointer value without any `<remote>/` prefix.
    pub fn local_name(&self) -> &str {
        let value = self.pointer.value();
        self.remote
            .as_deref()
            .and_then(|remote| value.strip_prefix(remote))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(value)
    }
}

/// Raw lookup result before the caller's expected variant is applied.
struct Found {
    pointer: GitPointer,
    oid: String,
    remote_tracking: bool,
}

impl GitRepo {
    /// Resolve `pointer` to an existing branch, tag or commit.
    ///
    /// Local names are tried first when `scope.local` is set or the pointer is
    /// not a branch. Branches are then looked up under each remote, in name
    /// order. When the local pass was skipped and no remote matched, local is
    /// tried anyway. `Ok(None)` means the pointer does not exist.
    pub fn resolve(
        &self,
        pointer: &GitPointer,
        scope: ResolveScope,
    ) -> Result<Option<Resolution>, RepoError> {
        let local_first = scope.local || !pointer.is_branch();
        if local_first && let Some(found) = self.resolve_local(pointer)? {
            return Ok(Some(found));
        }

        if scope.remote && pointer.is_branch() {
            for remote in self.backend().remotes()? {
                let scoped = pointer.with_value(format!("{}/{}", remote.name, pointer.value()));
                let full_name = format!("refs/remotes/{}", scoped.value());
                let Some(reference) = self.backend().find_reference(&full_name)? else {
                    continue;
                };
                tracing::debug!("Found {scoped} on remote `{}`", remote.name);
                return Ok(Some(Resolution {
                    pointer: scoped,
                    is_local: false,
                    remote: Some(remote.name),
                    oid: reference.oid,
                }));
            }
        }

        if !local_first {
            return self.resolve_local(pointer);
        }
        Ok(None)
    }

    /// Resolve a raw name of unknown variant.
    pub fn resolve_name(
        &self,
        name: &str,
        scope: ResolveScope,
    ) -> Result<Option<Resolution>, RepoError> {
        self.resolve(&GitPointer::Unknown(name.to_string()), scope)
    }

    pub fn exists(&self, pointer: &GitPointer, scope: ResolveScope) -> Result<bool, RepoError> {
        let exists = self.resolve(pointer, scope)?.is_some();
        tracing::debug!(
            "The {pointer} {}",
            if exists { "exists" } else { "does not exist" }
        );
        Ok(exists)
    }

    /// What `name` refers to locally: a reference first, then a raw object.
    pub fn pointer_for(&self, name: &str) -> Result<Option<GitPointer>, RepoError> {
        Ok(self.lookup(name)?.map(|found| found.pointer))
    }

    /// Full oid of the commit `pointer` names.
    pub fn commit_for(&self, pointer: &GitPointer) -> Result<String, RepoError> {
        for namespace in own_namespaces(pointer) {
            let full_name = format!("{namespace}{}", pointer.value());
            if let Some(oid) = self.backend().resolve_commit(&full_name)? {
                return Ok(oid);
            }
        }
        self.backend()
            .resolve_commit(pointer.value())?
            .ok_or_else(|| RepoError::NotFound(pointer.to_string()))
    }

    /// A reference by name, falling back to `<remote>/<name>` unless
    /// `only_local`, and finally to a raw commit.
    pub fn reference_named(
        &self,
        name: &str,
        only_local: bool,
    ) -> Result<Option<Resolution>, RepoError> {
        if let Some(found) = self.resolve_local(&GitPointer::Unknown(name.to_string()))? {
            return Ok(Some(found));
        }
        if only_local {
            return Ok(None);
        }
        self.resolve(
            &GitPointer::Branch(name.to_string()),
            ResolveScope::REMOTE,
        )
    }

    fn resolve_local(&self, pointer: &GitPointer) -> Result<Option<Resolution>, RepoError> {
        let Some(found) = self.lookup_typed(pointer)? else {
            return Ok(None);
        };
        let accepted = if found.pointer.is_commit() {
            // Commit pointers always carry the full oid.
            (pointer.is_unknown() || pointer.is_commit()).then(|| found.pointer.clone())
        } else if pointer.is_unknown() || found.pointer.kind() == pointer.kind() {
            Some(found.pointer.with_value(pointer.value()))
        } else {
            None
        };
        let Some(accepted) = accepted else {
            tracing::warn!("Found a {}, but it is not a {}.", found.pointer, pointer.kind());
            return Ok(None);
        };
        Ok(Some(Resolution {
            pointer: accepted,
            is_local: !found.remote_tracking,
            remote: None,
            oid: found.oid,
        }))
    }

    fn lookup_typed(&self, pointer: &GitPointer) -> Result<Option<Found>, RepoError> {
        for namespace in own_namespaces(pointer) {
            let full_name = format!("{namespace}{}", pointer.value());
            if let Some(found) = self.lookup_reference(&full_name)? {
                return Ok(Some(found));
            }
        }
        self.lookup(pointer.value())
    }

    fn lookup_reference(&self, name: &str) -> Result<Option<Found>, RepoError> {
        let Some(reference) = self.backend().find_reference(name)? else {
            return Ok(None);
        };
        let short = reference.short_name().to_string();
        let pointer = match reference.kind {
            RefKind::LocalBranch | RefKind::RemoteBranch => GitPointer::Branch(short),
            RefKind::Tag => GitPointer::Tag(short),
            RefKind::Other => GitPointer::Commit(reference.oid.clone()),
        };
        Ok(Some(Found {
            pointer,
            remote_tracking: reference.kind == RefKind::RemoteBranch,
            oid: reference.oid,
        }))
    }

    fn lookup(&self, name: &str) -> Result<Option<Found>, RepoError> {
        if let Some(found) = self.lookup_reference(name)? {
            return Ok(Some(found));
        }
        Ok(self.backend().find_object(name)?.map(|object| {
            let oid = object.oid().to_string();
            let pointer = match object {
                ObjectInfo::Commit(oid) => GitPointer::Commit(oid),
                ObjectInfo::Tag { name, .. } => GitPointer::Tag(name),
            };
            Found {
                pointer,
                oid,
                remote_tracking: false,
            }
        }))
    }
}

/// Where a typed pointer lives, searched before git's usual DWIM order so a
/// tag sharing a branch's name cannot shadow it (and vice versa).
fn own_namespaces(pointer: &GitPointer) -> &'static [&'static str] {
    match pointer {
        GitPointer::Branch(_) => &["refs/heads/", "refs/remotes/"],
        GitPointer::Tag(_) => &["refs/tags/"],
        GitPointer::Commit(_) | GitPointer::Unknown(_) => &[],
    }
}
