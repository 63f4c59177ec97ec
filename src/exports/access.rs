//! Role policy for the export catalog

use crate::exports::model::{ExportDescriptor, Role};

/// What a role is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    OwnRole(Role),
}

pub fn visibility(role: Role) -> Visibility {
    match role {
        Role::Admin => Visibility::All,
        Role::A | Role::B => Visibility::OwnRole(role),
    }
}

impl Visibility {
    pub fn allows(&self, descriptor: &ExportDescriptor) -> bool {
        match self {
            Visibility::All => true,
            Visibility::OwnRole(role) => descriptor.role == *role,
        }
    }
}

/// Whether `role` may list, download or refresh `descriptor`
pub fn can_access(role: Role, descriptor: &ExportDescriptor) -> bool {
    visibility(role).allows(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let a = ExportDescriptor::new("sales_q1", Role::A);
        let b = ExportDescriptor::new("stock", Role::B);

        assert!(can_access(Role::Admin, &a));
        assert!(can_access(Role::Admin, &b));
        assert!(can_access(Role::A, &a));
        assert!(!can_access(Role::A, &b));
        assert!(!can_access(Role::B, &a));
    }
}
