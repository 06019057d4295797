//! Qualified action identifiers.

use std::fmt;

/// Separator between the controller type name and the action name.
pub const QUALIFIER_SEPARATOR: &str = "::";

/// `TypeName::action`, the key used by global and per-middleware exclusion lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedAction(String);

impl QualifiedAction {
    pub fn new(type_name: &str, action: &str) -> Self {
        let mut id = String::with_capacity(type_name.len() + QUALIFIER_SEPARATOR.len() + action.len());
        id.push_str(type_name);
        id.push_str(QUALIFIER_SEPARATOR);
        id.push_str(action);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Controller type part of the identifier.
    pub fn type_name(&self) -> &str {
        self.0
            .rsplit_once(QUALIFIER_SEPARATOR)
            .map(|(ty, _)| ty)
            .unwrap_or(&self.0)
    }

    /// Action part of the identifier.
    pub fn action(&self) -> &str {
        self.0
            .rsplit_once(QUALIFIER_SEPARATOR)
            .map(|(_, action)| action)
            .unwrap_or("")
    }

    /// True if `list` names this action.
    pub fn is_listed_in<S: AsRef<str>>(&self, list: &[S]) -> bool {
        list.iter().any(|entry| entry.as_ref() == self.0)
    }
}

impl fmt::Display for QualifiedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QualifiedAction {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for QualifiedAction {
    fn borrow(&self) -> &str {
        &self.0
    }
}
