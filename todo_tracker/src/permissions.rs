//! Permission codes granted to users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionCode {
    #[serde(rename = "todos:read")]
    TodosRead,
    #[serde(rename = "todos:write")]
    TodosWrite,
}

impl PermissionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCode::TodosRead => "todos:read",
            PermissionCode::TodosWrite => "todos:write",
        }
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todos:read" => Ok(PermissionCode::TodosRead),
            "todos:write" => Ok(PermissionCode::TodosWrite),
            other => Err(format!("unknown permission code '{other}'")),
        }
    }
}

/// The set of permissions held by one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Permissions(Vec<PermissionCode>);

impl Permissions {
    pub fn new(codes: Vec<PermissionCode>) -> Self {
        Self(codes)
    }

    pub fn includes(&self, code: PermissionCode) -> bool {
        self.0.contains(&code)
    }

    pub fn codes(&self) -> &[PermissionCode] {
        &self.0
    }
}

impl FromIterator<PermissionCode> for Permissions {
    fn from_iter<I: IntoIterator<Item = PermissionCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includes() {
        let perms: Permissions = [PermissionCode::TodosRead].into_iter().collect();
        assert!(perms.includes(PermissionCode::TodosRead));
        assert!(!perms.includes(PermissionCode::TodosWrite));
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!(
            "todos:write".parse::<PermissionCode>(),
            Ok(PermissionCode::TodosWrite)
        );
        assert!("movies:read".parse::<PermissionCode>().is_err());
        assert_eq!(PermissionCode::TodosRead.to_string(), "todos:read");
    }
}
