use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Kinds of child resources managed beneath an owning object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    ServiceAccount,
    Role,
    RoleBinding,
}

impl Kind {
    /// Order in which kinds are reconciled within one pass.
    ///
    /// Subjects and roles come before the bindings that reference them.
    pub const RECONCILE_ORDER: [Kind; 3] = [Kind::ServiceAccount, Kind::Role, Kind::RoleBinding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ServiceAccount => "ServiceAccount",
            Kind::Role => "Role",
            Kind::RoleBinding => "RoleBinding",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Kind::ServiceAccount => "v1",
            Kind::Role | Kind::RoleBinding => "rbac.authorization.k8s.io/v1",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ServiceAccount" => Ok(Kind::ServiceAccount),
            "Role" => Ok(Kind::Role),
            "RoleBinding" => Ok(Kind::RoleBinding),
            other => Err(CoreError::invalid_kind(other)),
        }
    }
}
