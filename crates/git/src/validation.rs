use crate::RepoError;

pub fn is_valid_branch_name(name: &str) -> bool {
    !name.is_empty() && git2::Branch::name_is_valid(name).unwrap_or_default()
}

pub fn is_valid_tag_name(name: &str) -> bool {
    !name.is_empty() && git2::Tag::is_valid_name(name)
}

/// True for 4..=40 hex digits, the forms git accepts as an abbreviated or full sha1.
pub fn is_valid_oid_prefix(value: &str) -> bool {
    (4..=40).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn ensure_branch_name(name: &str) -> Result<(), RepoError> {
    if is_valid_branch_name(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidArgument(format!(
            "`{name}` is not a valid branch name"
        )))
    }
}

pub(crate) fn ensure_tag_name(name: &str) -> Result<(), RepoError> {
    if is_valid_tag_name(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidArgument(format!(
            "`{name}` is not a valid tag name"
        )))
    }
}

pub(crate) fn ensure_oid(value: &str) -> Result<(), RepoError> {
    if is_valid_oid_prefix(value) {
        Ok(())
    } else {
        Err(RepoError::InvalidArgument(format!(
            "`{value}` is not a commit id"
        )))
    }
}
