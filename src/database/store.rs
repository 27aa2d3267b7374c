use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{
    Module, ModuleProgress, PoinDetail, PoinProgress, Profile, Quiz, QuizAttempt, QuizQuestion,
    SubMaterial, SubMaterialProgress,
};
use crate::types::ModuleStatus;

pub type StoreResult<T> = Result<T, DatabaseError>;

/// Result of a start-or-resume call
#[derive(Debug, Clone)]
pub struct StartedAttempt {
    pub attempt: QuizAttempt,
    /// True when an open attempt already existed and was returned as is
    pub existing: bool,
}

/// Result of a scroll completion mark
#[derive(Debug, Clone)]
pub struct ScrollOutcome {
    pub progress: PoinProgress,
    pub already_completed: bool,
}

/// Read side of the catalog: modules, sub-materials, poins, quizzes and profiles.
///
/// Ordered lists come back sorted by `order_index` (modules by creation time).
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_module(&self, id: Uuid) -> StoreResult<Option<Module>>;
    async fn list_published_modules(&self) -> StoreResult<Vec<Module>>;

    async fn list_sub_materials(&self, module_id: Uuid) -> StoreResult<Vec<SubMaterial>>;
    async fn find_sub_material(&self, id: Uuid) -> StoreResult<Option<SubMaterial>>;
    async fn find_sub_material_at(&self, module_id: Uuid, order_index: i32) -> StoreResult<Option<SubMaterial>>;
    async fn count_published_sub_materials(&self) -> StoreResult<i64>;

    async fn list_poins(&self, sub_material_id: Uuid) -> StoreResult<Vec<PoinDetail>>;
    async fn find_poin(&self, id: Uuid) -> StoreResult<Option<PoinDetail>>;

    async fn find_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>>;
    async fn list_quizzes_by_module(&self, module_id: Uuid) -> StoreResult<Vec<Quiz>>;
    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>>;
    async fn list_questions(&self, quiz_id: Uuid) -> StoreResult<Vec<QuizQuestion>>;

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    /// Learner profiles, optionally filtered by a case-insensitive name/email search
    async fn list_learners(&self, search: Option<&str>) -> StoreResult<Vec<Profile>>;
}

/// Per-user progress rows. Every write is an upsert keyed by (user, entity).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn find_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<Option<ModuleProgress>>;
    /// Newest access first
    async fn list_module_progress(&self, user_id: Uuid) -> StoreResult<Vec<ModuleProgress>>;
    /// Insert a not-started row if none exists; an existing row is returned untouched
    async fn ensure_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<ModuleProgress>;
    /// Overwrite percent, status and completion time and refresh `last_accessed_at`
    async fn save_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        percent: i32,
        status: ModuleStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<ModuleProgress>;

    async fn find_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<Option<SubMaterialProgress>>;
    async fn list_sub_material_progress(&self, user_id: Uuid) -> StoreResult<Vec<SubMaterialProgress>>;
    /// Insert with the given lock state if absent; an existing row is returned untouched
    async fn ensure_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid, unlocked: bool) -> StoreResult<SubMaterialProgress>;
    async fn unlock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress>;
    /// Re-lock an existing, unlocked, not completed row. Returns whether a row changed.
    async fn lock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<bool>;
    /// Store reading percent and poin cursor; a missing row is created unlocked
    async fn save_sub_material_reading(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        percent: i32,
        current_poin_index: i32,
    ) -> StoreResult<SubMaterialProgress>;
    async fn complete_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress>;
    /// Complete every listed poin and the sub-material itself as one atomic write
    async fn complete_sub_material_content(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        poin_ids: &[Uuid],
    ) -> StoreResult<SubMaterialProgress>;

    async fn find_poin_progress(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<Option<PoinProgress>>;
    async fn list_poin_progress(&self, user_id: Uuid) -> StoreResult<Vec<PoinProgress>>;
    async fn list_all_poin_progress(&self) -> StoreResult<Vec<PoinProgress>>;
    async fn complete_poin(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<PoinProgress>;
    async fn mark_poin_scrolled(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<ScrollOutcome>;

    /// Return the open attempt for (user, quiz) or create one. Never yields two open attempts.
    async fn start_attempt(&self, user_id: Uuid, quiz_id: Uuid, total_questions: i32) -> StoreResult<StartedAttempt>;
    async fn insert_completed_attempt(&self, attempt: QuizAttempt) -> StoreResult<QuizAttempt>;
    /// Newest first, open attempts included
    async fn list_attempts(&self, user_id: Uuid, quiz_id: Option<Uuid>) -> StoreResult<Vec<QuizAttempt>>;
    /// Completed attempts of every user, oldest first
    async fn list_completed_attempts(&self) -> StoreResult<Vec<QuizAttempt>>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Everything the services need from persistence
pub trait Store: ContentStore + ProgressStore {}

impl<T: ContentStore + ProgressStore> Store for T {}
