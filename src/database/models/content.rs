use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered unit of a module. `order_index` is unique per module and drives unlocking.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubMaterial {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub order_index: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PoinDetail {
    pub id: Uuid,
    pub sub_material_id: Uuid,
    pub title: String,
    pub content_html: Option<String>,
    pub duration_minutes: Option<i32>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}
