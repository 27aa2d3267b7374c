use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::{
    Module, ModuleProgress, PoinDetail, PoinProgress, Profile, Quiz, QuizAttempt, QuizQuestion,
    SubMaterial, SubMaterialProgress,
};
use super::store::{ContentStore, ProgressStore, ScrollOutcome, StartedAttempt, StoreResult};
use crate::types::{ModuleStatus, Role};

/// Postgres-backed store. Upserts rely on the unique (user, entity) constraints.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn find_module(&self, id: Uuid) -> StoreResult<Option<Module>> {
        let row = sqlx::query_as::<_, Module>("SELECT * FROM modules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_published_modules(&self) -> StoreResult<Vec<Module>> {
        let rows = sqlx::query_as::<_, Module>(
            "SELECT * FROM modules WHERE published = true ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_sub_materials(&self, module_id: Uuid) -> StoreResult<Vec<SubMaterial>> {
        let rows = sqlx::query_as::<_, SubMaterial>(
            "SELECT * FROM sub_materials WHERE module_id = $1 ORDER BY order_index",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_sub_material(&self, id: Uuid) -> StoreResult<Option<SubMaterial>> {
        let row = sqlx::query_as::<_, SubMaterial>("SELECT * FROM sub_materials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_sub_material_at(&self, module_id: Uuid, order_index: i32) -> StoreResult<Option<SubMaterial>> {
        let row = sqlx::query_as::<_, SubMaterial>(
            "SELECT * FROM sub_materials WHERE module_id = $1 AND order_index = $2",
        )
        .bind(module_id)
        .bind(order_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_published_sub_materials(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sub_materials WHERE published = true")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_poins(&self, sub_material_id: Uuid) -> StoreResult<Vec<PoinDetail>> {
        let rows = sqlx::query_as::<_, PoinDetail>(
            "SELECT * FROM poin_details WHERE sub_material_id = $1 ORDER BY order_index",
        )
        .bind(sub_material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_poin(&self, id: Uuid) -> StoreResult<Option<PoinDetail>> {
        let row = sqlx::query_as::<_, PoinDetail>("SELECT * FROM poin_details WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        let row = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_quizzes_by_module(&self, module_id: Uuid) -> StoreResult<Vec<Quiz>> {
        let rows = sqlx::query_as::<_, Quiz>(
            "SELECT * FROM quizzes WHERE module_id = $1 ORDER BY created_at, id",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        let rows = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_questions(&self, quiz_id: Uuid) -> StoreResult<Vec<QuizQuestion>> {
        let rows = sqlx::query_as::<_, QuizQuestion>(
            "SELECT * FROM quiz_questions WHERE quiz_id = $1 ORDER BY order_index",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let row = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_learners(&self, search: Option<&str>) -> StoreResult<Vec<Profile>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));

        let rows = sqlx::query_as::<_, Profile>(
            r#"
            SELECT * FROM profiles
            WHERE role = $1
              AND ($2::TEXT IS NULL OR full_name ILIKE $2 OR email ILIKE $2)
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(Role::Learner.as_str())
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn find_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<Option<ModuleProgress>> {
        let row = sqlx::query_as::<_, ModuleProgress>(
            "SELECT * FROM user_module_progress WHERE user_id = $1 AND module_id = $2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_module_progress(&self, user_id: Uuid) -> StoreResult<Vec<ModuleProgress>> {
        let rows = sqlx::query_as::<_, ModuleProgress>(
            "SELECT * FROM user_module_progress WHERE user_id = $1 ORDER BY last_accessed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ensure_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<ModuleProgress> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, ModuleProgress>(
            r#"
            INSERT INTO user_module_progress (id, user_id, module_id, status, progress_percent)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (user_id, module_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(module_id)
        .bind(ModuleStatus::NotStarted.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        percent: i32,
        status: ModuleStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<ModuleProgress> {
        let row = sqlx::query_as::<_, ModuleProgress>(
            r#"
            INSERT INTO user_module_progress
                (id, user_id, module_id, status, progress_percent, completed_at, last_accessed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (user_id, module_id) DO UPDATE SET
                status = EXCLUDED.status,
                progress_percent = EXCLUDED.progress_percent,
                completed_at = EXCLUDED.completed_at,
                last_accessed_at = now(),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(module_id)
        .bind(status.as_str())
        .bind(percent)
        .bind(completed_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<Option<SubMaterialProgress>> {
        let row = sqlx::query_as::<_, SubMaterialProgress>(
            "SELECT * FROM user_sub_material_progress WHERE user_id = $1 AND sub_material_id = $2",
        )
        .bind(user_id)
        .bind(sub_material_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_sub_material_progress(&self, user_id: Uuid) -> StoreResult<Vec<SubMaterialProgress>> {
        let rows = sqlx::query_as::<_, SubMaterialProgress>(
            "SELECT * FROM user_sub_material_progress WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ensure_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid, unlocked: bool) -> StoreResult<SubMaterialProgress> {
        let row = sqlx::query_as::<_, SubMaterialProgress>(
            r#"
            INSERT INTO user_sub_material_progress (id, user_id, sub_material_id, is_unlocked)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, sub_material_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(sub_material_id)
        .bind(unlocked)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn unlock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress> {
        let row = sqlx::query_as::<_, SubMaterialProgress>(
            r#"
            INSERT INTO user_sub_material_progress (id, user_id, sub_material_id, is_unlocked)
            VALUES ($1, $2, $3, true)
            ON CONFLICT (user_id, sub_material_id) DO UPDATE SET
                is_unlocked = true,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(sub_material_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn lock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_sub_material_progress
            SET is_unlocked = false, updated_at = now()
            WHERE user_id = $1 AND sub_material_id = $2
              AND is_unlocked = true AND is_completed = false
            "#,
        )
        .bind(user_id)
        .bind(sub_material_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_sub_material_reading(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        percent: i32,
        current_poin_index: i32,
    ) -> StoreResult<SubMaterialProgress> {
        let row = sqlx::query_as::<_, SubMaterialProgress>(
            r#"
            INSERT INTO user_sub_material_progress
                (id, user_id, sub_material_id, is_unlocked, progress_percent, current_poin_index)
            VALUES ($1, $2, $3, true, $4, $5)
            ON CONFLICT (user_id, sub_material_id) DO UPDATE SET
                progress_percent = EXCLUDED.progress_percent,
                current_poin_index = EXCLUDED.current_poin_index,
                last_accessed_at = now(),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(sub_material_id)
        .bind(percent)
        .bind(current_poin_index)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn complete_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress> {
        let row = sqlx::query_as::<_, SubMaterialProgress>(COMPLETE_SUB_MATERIAL_SQL)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(sub_material_id)
            .bind(None::<i32>)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn complete_sub_material_content(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        poin_ids: &[Uuid],
    ) -> StoreResult<SubMaterialProgress> {
        let mut tx = self.pool.begin().await?;

        for poin_id in poin_ids {
            sqlx::query(COMPLETE_POIN_SQL)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(poin_id)
                .execute(&mut *tx)
                .await?;
        }

        let row = sqlx::query_as::<_, SubMaterialProgress>(COMPLETE_SUB_MATERIAL_SQL)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(sub_material_id)
            .bind(Some(poin_ids.len() as i32))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn find_poin_progress(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<Option<PoinProgress>> {
        let row = sqlx::query_as::<_, PoinProgress>(
            "SELECT * FROM user_poin_progress WHERE user_id = $1 AND poin_id = $2",
        )
        .bind(user_id)
        .bind(poin_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_poin_progress(&self, user_id: Uuid) -> StoreResult<Vec<PoinProgress>> {
        let rows = sqlx::query_as::<_, PoinProgress>("SELECT * FROM user_poin_progress WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_all_poin_progress(&self) -> StoreResult<Vec<PoinProgress>> {
        let rows = sqlx::query_as::<_, PoinProgress>("SELECT * FROM user_poin_progress")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn complete_poin(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<PoinProgress> {
        let row = sqlx::query_as::<_, PoinProgress>(COMPLETE_POIN_SQL)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(poin_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn mark_poin_scrolled(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<ScrollOutcome> {
        // Only a row that flips from false to true comes back from the upsert
        let flipped = sqlx::query_as::<_, PoinProgress>(
            r#"
            INSERT INTO user_poin_progress (id, user_id, poin_id, scroll_completed, scroll_completed_at)
            VALUES ($1, $2, $3, true, now())
            ON CONFLICT (user_id, poin_id) DO UPDATE SET
                scroll_completed = true,
                scroll_completed_at = now()
            WHERE user_poin_progress.scroll_completed = false
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(poin_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(progress) = flipped {
            return Ok(ScrollOutcome { progress, already_completed: false });
        }

        let progress = self
            .find_poin_progress(user_id, poin_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("poin progress {}", poin_id)))?;
        Ok(ScrollOutcome { progress, already_completed: true })
    }

    async fn start_attempt(&self, user_id: Uuid, quiz_id: Uuid, total_questions: i32) -> StoreResult<StartedAttempt> {
        // quiz_attempts_one_open turns a racing second insert into a no-op
        let inserted = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (id, quiz_id, user_id, total_questions)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, quiz_id) WHERE completed_at IS NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quiz_id)
        .bind(user_id)
        .bind(total_questions)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(attempt) = inserted {
            return Ok(StartedAttempt { attempt, existing: false });
        }

        let attempt = sqlx::query_as::<_, QuizAttempt>(
            "SELECT * FROM quiz_attempts WHERE user_id = $1 AND quiz_id = $2 AND completed_at IS NULL",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::QueryError("open attempt vanished after conflict".to_string()))?;

        Ok(StartedAttempt { attempt, existing: true })
    }

    async fn insert_completed_attempt(&self, attempt: QuizAttempt) -> StoreResult<QuizAttempt> {
        let row = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts
                (id, quiz_id, user_id, score, total_questions, correct_answers, passed, answers,
                 started_at, completed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.quiz_id)
        .bind(attempt.user_id)
        .bind(attempt.score)
        .bind(attempt.total_questions)
        .bind(attempt.correct_answers)
        .bind(attempt.passed)
        .bind(&attempt.answers)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_attempts(&self, user_id: Uuid, quiz_id: Option<Uuid>) -> StoreResult<Vec<QuizAttempt>> {
        let rows = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT * FROM quiz_attempts
            WHERE user_id = $1 AND ($2::UUID IS NULL OR quiz_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_completed_attempts(&self) -> StoreResult<Vec<QuizAttempt>> {
        let rows = sqlx::query_as::<_, QuizAttempt>(
            "SELECT * FROM quiz_attempts WHERE completed_at IS NOT NULL ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn health_check(&self) -> StoreResult<()> {
        DatabaseManager::health_check(&self.pool).await
    }
}

/// $4 is the poin cursor to store, or NULL to keep the current one
const COMPLETE_SUB_MATERIAL_SQL: &str = r#"
    INSERT INTO user_sub_material_progress
        (id, user_id, sub_material_id, is_unlocked, is_completed, progress_percent,
         current_poin_index, completed_at)
    VALUES ($1, $2, $3, true, true, 100, COALESCE($4::INTEGER, 0), now())
    ON CONFLICT (user_id, sub_material_id) DO UPDATE SET
        is_unlocked = true,
        is_completed = true,
        progress_percent = 100,
        current_poin_index = COALESCE($4::INTEGER, user_sub_material_progress.current_poin_index),
        completed_at = COALESCE(user_sub_material_progress.completed_at, now()),
        last_accessed_at = now(),
        updated_at = now()
    RETURNING *
"#;

const COMPLETE_POIN_SQL: &str = r#"
    INSERT INTO user_poin_progress (id, user_id, poin_id, is_completed, completed_at)
    VALUES ($1, $2, $3, true, now())
    ON CONFLICT (user_id, poin_id) DO UPDATE SET
        is_completed = true,
        completed_at = COALESCE(user_poin_progress.completed_at, now())
    RETURNING *
"#;
