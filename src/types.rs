/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored label that did not match any known variant
#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Profile role. Learners are stored as "pengguna".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "pengguna")]
    Learner,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "superadmin")]
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "pengguna",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pengguna" => Ok(Role::Learner),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(UnknownVariant { kind: "role", value: other.to_string() }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored status of a (user, module) progress row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::NotStarted => "not-started",
            ModuleStatus::InProgress => "in-progress",
            ModuleStatus::Completed => "completed",
        }
    }

    /// 0 is not started, 100 is completed, anything between is in progress.
    pub fn from_percent(percent: i32) -> Self {
        match percent {
            p if p <= 0 => ModuleStatus::NotStarted,
            p if p >= 100 => ModuleStatus::Completed,
            _ => ModuleStatus::InProgress,
        }
    }
}

impl FromStr for ModuleStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(ModuleStatus::NotStarted),
            "in-progress" => Ok(ModuleStatus::InProgress),
            "completed" => Ok(ModuleStatus::Completed),
            other => Err(UnknownVariant { kind: "module status", value: other.to_string() }),
        }
    }
}

impl TryFrom<String> for ModuleStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Derived learner label. Computed on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnerStatus {
    Active,
    Struggling,
    Inactive,
}

impl LearnerStatus {
    /// Listing order: struggling first, then active, then inactive.
    pub fn sort_rank(&self) -> u8 {
        match self {
            LearnerStatus::Struggling => 0,
            LearnerStatus::Active => 1,
            LearnerStatus::Inactive => 2,
        }
    }
}

/// `status` query parameter of the monitoring user list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Struggling,
    Inactive,
}

impl StatusFilter {
    pub fn matches(&self, status: LearnerStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == LearnerStatus::Active,
            StatusFilter::Struggling => status == LearnerStatus::Struggling,
            StatusFilter::Inactive => status == LearnerStatus::Inactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_status_follows_percent() {
        assert_eq!(ModuleStatus::from_percent(0), ModuleStatus::NotStarted);
        assert_eq!(ModuleStatus::from_percent(1), ModuleStatus::InProgress);
        assert_eq!(ModuleStatus::from_percent(99), ModuleStatus::InProgress);
        assert_eq!(ModuleStatus::from_percent(100), ModuleStatus::Completed);
    }

    #[test]
    fn role_round_trips_through_stored_label() {
        assert_eq!("pengguna".parse::<Role>().unwrap(), Role::Learner);
        assert_eq!(Role::Superadmin.as_str(), "superadmin");
        assert!(Role::Admin.is_admin());
        assert!(!Role::Learner.is_admin());
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let v = serde_json::to_value(LearnerStatus::Struggling).unwrap();
        assert_eq!(v, serde_json::json!("struggling"));
        let v = serde_json::to_value(ModuleStatus::InProgress).unwrap();
        assert_eq!(v, serde_json::json!("in-progress"));
    }

    #[test]
    fn struggling_sorts_first() {
        let mut all = vec![LearnerStatus::Inactive, LearnerStatus::Active, LearnerStatus::Struggling];
        all.sort_by_key(|s| s.sort_rank());
        assert_eq!(all, vec![LearnerStatus::Struggling, LearnerStatus::Active, LearnerStatus::Inactive]);
    }
}
