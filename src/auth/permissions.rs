use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewCatalog,
    TrackOwnProgress,
    TakeQuizzes,
    ViewOwnStats,

    ManageCatalog,
    ManageUserStats,
    AwardAchievements,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Learner,
    Admin,
}

static LEARNER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewCatalog);
    permissions.insert(Permission::TrackOwnProgress);
    permissions.insert(Permission::TakeQuizzes);
    permissions.insert(Permission::ViewOwnStats);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(LEARNER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageCatalog);
    permissions.insert(Permission::ManageUserStats);
    permissions.insert(Permission::AwardAchievements);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Learner => &LEARNER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" => Ok(Role::Learner),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_inherits_learner_permissions() {
        for permission in Role::Learner.permissions() {
            assert!(Role::Admin.has_permission(*permission));
        }
        assert!(Role::Admin.has_permission(Permission::ManageCatalog));
        assert!(!Role::Learner.has_permission(Permission::ManageCatalog));
        assert!(!Role::Learner.has_permission(Permission::AwardAchievements));
    }

    #[test]
    fn test_role_round_trip_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Learner.to_string(), "learner");
        assert!("coach".parse::<Role>().is_err());
    }
}
