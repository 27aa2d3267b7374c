use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::ModuleStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModuleProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: ModuleStatus,
    pub progress_percent: i32,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ModuleProgress {
    pub fn new(user_id: Uuid, module_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            module_id,
            status: ModuleStatus::NotStarted,
            progress_percent: 0,
            last_accessed_at: now,
            completed_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubMaterialProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sub_material_id: Uuid,
    pub is_unlocked: bool,
    pub is_completed: bool,
    pub progress_percent: i32,
    pub current_poin_index: i32,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SubMaterialProgress {
    pub fn new(user_id: Uuid, sub_material_id: Uuid, is_unlocked: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            sub_material_id,
            is_unlocked,
            is_completed: false,
            progress_percent: 0,
            current_poin_index: 0,
            last_accessed_at: now,
            completed_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PoinProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub poin_id: Uuid,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Weaker "viewed to the bottom" signal. Never reset once set.
    pub scroll_completed: bool,
    pub scroll_completed_at: Option<DateTime<Utc>>,
}

impl PoinProgress {
    pub fn new(user_id: Uuid, poin_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            poin_id,
            is_completed: false,
            completed_at: None,
            scroll_completed: false,
            scroll_completed_at: None,
        }
    }
}
