// Lockbox - Argument checks shared by the service layer

use crate::error::{LockboxError, Result};
use crate::store::GroupScope;

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LockboxError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Scope for an optional caller-supplied access group.
pub(crate) fn group_scope(group: Option<&str>) -> Result<GroupScope> {
    if let Some(group) = group {
        require_non_empty("access group", group)?;
    }
    Ok(GroupScope::from_option(group))
}
