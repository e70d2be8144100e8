//! Resolved caller identity.
//!
//! Authentication happens at the edge (bearer tokens in the HTTP layer, the
//! local user for CLI commands); the service only sees the resulting role.

use std::fmt;

/// What a caller is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Publish, deactivate, delete and read packages.
    SuperAdmin,
    /// Read package records.
    Support,
    /// Check for and download updates only.
    Node,
}

impl Role {
    /// May upload, generate, deactivate and delete.
    pub fn can_publish(self) -> bool {
        matches!(self, Self::SuperAdmin)
    }

    /// May list and inspect records, including inactive ones.
    pub fn can_read(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Support)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SuperAdmin => "superadmin",
            Self::Support => "support",
            Self::Node => "node",
        })
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Decides what the caller may do.
    pub role: Role,
}

impl Caller {
    /// A caller acting in `role`.
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    /// The local operator running CLI commands.
    pub fn local_admin() -> Self {
        Self::new(Role::SuperAdmin)
    }
}
