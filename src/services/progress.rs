use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::unlock::{is_first_in_module, SubMaterialState};
use super::{percentage, ProgressAggregator, ServiceError, ServiceResult, UnlockEngine};
use crate::database::models::{
    Module, ModuleProgress, PoinDetail, PoinProgress, QuizAttempt, SubMaterial, SubMaterialProgress,
};
use crate::database::Store;
use crate::types::ModuleStatus;

const ACCESS_GRANTED: &str = "Access granted";
const ACCESS_LOCKED: &str = "Complete previous sub-materi to unlock";

#[derive(Debug, Serialize)]
pub struct ModulesOverview {
    pub modules: Vec<ModuleProgressItem>,
    pub overall_progress: OverallProgress,
}

#[derive(Debug, Serialize)]
pub struct ModuleProgressItem {
    pub id: Uuid,
    pub module_id: Uuid,
    pub module_title: String,
    pub module_slug: String,
    pub progress_percentage: i32,
    pub status: ModuleStatus,
    pub completed: bool,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OverallProgress {
    pub total_modules: usize,
    pub completed_modules: usize,
    pub percentage: i32,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

impl From<Module> for ModuleInfo {
    fn from(m: Module) -> Self {
        Self { id: m.id, title: m.title, slug: m.slug, description: m.description }
    }
}

#[derive(Debug, Serialize)]
pub struct ModuleProgressSummary {
    pub status: ModuleStatus,
    pub progress_percent: i32,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ModuleProgress> for ModuleProgressSummary {
    fn from(p: ModuleProgress) -> Self {
        Self {
            status: p.status,
            progress_percent: p.progress_percent,
            last_accessed_at: p.last_accessed_at,
            completed_at: p.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModuleProgressView {
    pub module: ModuleInfo,
    pub progress: ModuleProgressSummary,
    pub sub_materis: Vec<SubMaterialState>,
}

#[derive(Debug, Serialize)]
pub struct PoinState {
    pub id: Uuid,
    pub title: String,
    pub order_index: i32,
    pub is_completed: bool,
    pub scroll_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct SubMaterialProgressView {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub order_index: i32,
    pub is_unlocked: bool,
    pub is_completed: bool,
    pub progress_percent: i32,
    pub current_poin_index: i32,
    pub poins: Vec<PoinState>,
}

#[derive(Debug, Serialize)]
pub struct SubMaterialCompletion {
    pub sub_material: SubMaterialProgress,
    pub module: ModuleProgress,
    /// Sub-material unlocked as a result, if any
    pub next_unlocked: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MaterialAccess {
    pub can_access: bool,
    pub sub_materi_id: Uuid,
    pub is_unlocked: bool,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PoinCompletion {
    pub poin: PoinProgress,
    pub sub_material: SubMaterialProgress,
}

#[derive(Debug, Serialize)]
pub struct ScrollCompletion {
    pub already_completed: bool,
    pub scroll_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScrollStatus {
    pub scroll_completed: bool,
    pub scroll_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct QuizProgress {
    pub quiz_id: Uuid,
    pub attempts_count: usize,
    pub best_score: f64,
    pub passed: bool,
    pub last_attempt: Option<QuizAttempt>,
    pub recent_attempts: Vec<QuizAttempt>,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total_modules: usize,
    pub completed_modules: usize,
    pub module_completion_rate: i32,
    pub total_materials: usize,
    pub completed_materials: usize,
    pub material_completion_rate: i32,
    pub total_quiz_attempts: usize,
    pub passed_quizzes: usize,
    pub average_quiz_score: i64,
}

/// Learner-facing progress reads and writes
#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn Store>,
    aggregator: ProgressAggregator,
    unlock: UnlockEngine,
}

impl ProgressService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            aggregator: ProgressAggregator::new(store.clone()),
            unlock: UnlockEngine::new(store.clone()),
            store,
        }
    }

    async fn sub_material(&self, id: Uuid) -> ServiceResult<SubMaterial> {
        self.store
            .find_sub_material(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sub-materi".to_string()))
    }

    async fn poin(&self, id: Uuid) -> ServiceResult<PoinDetail> {
        self.store
            .find_poin(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Poin".to_string()))
    }

    pub async fn modules_overview(&self, user_id: Uuid) -> ServiceResult<ModulesOverview> {
        let published = self.store.list_published_modules().await?;
        let rows = self.store.list_module_progress(user_id).await?;

        let mut modules = Vec::with_capacity(rows.len());
        for row in rows {
            // Rows of deleted modules are skipped
            let Some(module) = self.store.find_module(row.module_id).await? else {
                continue;
            };
            modules.push(ModuleProgressItem {
                id: row.id,
                module_id: row.module_id,
                module_title: module.title,
                module_slug: module.slug,
                progress_percentage: row.progress_percent,
                status: row.status,
                completed: row.status == ModuleStatus::Completed,
                last_accessed_at: row.last_accessed_at,
                completed_at: row.completed_at,
            });
        }

        let completed_modules = modules.iter().filter(|m| m.completed).count();
        Ok(ModulesOverview {
            overall_progress: OverallProgress {
                total_modules: published.len(),
                completed_modules,
                percentage: percentage(completed_modules, published.len()),
            },
            modules,
        })
    }

    /// Opening a module creates its progress row, makes sure the first
    /// sub-material is unlocked, then re-evaluates the unlock chain.
    pub async fn module_progress(&self, user_id: Uuid, module_id: Uuid) -> ServiceResult<ModuleProgressView> {
        let module = self
            .store
            .find_module(module_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Module".to_string()))?;

        let progress = self.store.ensure_module_progress(user_id, module_id).await?;

        if let Some(first) = self.store.list_sub_materials(module_id).await?.first() {
            let row = self.store.ensure_sub_material_progress(user_id, first.id, true).await?;
            if !row.is_unlocked {
                self.store.unlock_sub_material(user_id, first.id).await?;
                info!(%user_id, sub_material_id = %first.id, "Unlocked first sub-material of module");
            }
        }

        let sub_materis = self.unlock.evaluate(user_id, module_id).await?;

        Ok(ModuleProgressView {
            module: module.into(),
            progress: progress.into(),
            sub_materis,
        })
    }

    pub async fn sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid) -> ServiceResult<SubMaterialProgressView> {
        let sub = self.sub_material(sub_material_id).await?;
        let is_first = is_first_in_module(self.store.as_ref(), &sub).await?;
        let row = self
            .store
            .ensure_sub_material_progress(user_id, sub.id, is_first)
            .await?;

        let poin_rows: HashMap<Uuid, PoinProgress> = self
            .store
            .list_poin_progress(user_id)
            .await?
            .into_iter()
            .map(|p| (p.poin_id, p))
            .collect();
        let poins = self
            .store
            .list_poins(sub.id)
            .await?
            .into_iter()
            .map(|poin| {
                let progress = poin_rows.get(&poin.id);
                PoinState {
                    id: poin.id,
                    title: poin.title,
                    order_index: poin.order_index,
                    is_completed: progress.map(|p| p.is_completed).unwrap_or(false),
                    scroll_completed: progress.map(|p| p.scroll_completed).unwrap_or(false),
                }
            })
            .collect();

        Ok(SubMaterialProgressView {
            id: sub.id,
            module_id: sub.module_id,
            title: sub.title,
            order_index: sub.order_index,
            is_unlocked: is_first || row.is_unlocked,
            is_completed: row.is_completed,
            progress_percent: row.progress_percent,
            current_poin_index: row.current_poin_index,
            poins,
        })
    }

    /// Force-complete a sub-material, then roll the module forward
    pub async fn complete_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> ServiceResult<SubMaterialCompletion> {
        let sub = self.sub_material(sub_material_id).await?;

        let sub_material = self.store.complete_sub_material(user_id, sub.id).await?;
        let module = self.aggregator.update_module_progress(user_id, sub.module_id).await?;
        let next = self.unlock.unlock_next(user_id, sub.module_id, sub.id).await?;

        info!(%user_id, sub_material_id = %sub.id, module_percent = module.progress_percent, "Sub-material completed");
        Ok(SubMaterialCompletion {
            sub_material,
            module,
            next_unlocked: next.map(|n| n.sub_material_id),
        })
    }

    pub async fn check_access(&self, user_id: Uuid, sub_material_id: Uuid) -> ServiceResult<MaterialAccess> {
        let sub = self.sub_material(sub_material_id).await?;
        let is_first = is_first_in_module(self.store.as_ref(), &sub).await?;
        let unlocked = is_first
            || self
                .store
                .find_sub_material_progress(user_id, sub.id)
                .await?
                .map(|p| p.is_unlocked)
                .unwrap_or(false);

        Ok(MaterialAccess {
            can_access: unlocked,
            sub_materi_id: sub.id,
            is_unlocked: unlocked,
            reason: if unlocked { ACCESS_GRANTED } else { ACCESS_LOCKED },
        })
    }

    /// Unknown poins are rejected before anything is written
    pub async fn complete_poin(&self, user_id: Uuid, poin_id: Uuid) -> ServiceResult<PoinCompletion> {
        let poin_detail = self.poin(poin_id).await?;
        let poin = self.store.complete_poin(user_id, poin_detail.id).await?;
        let sub_material = self
            .aggregator
            .update_sub_material_progress(user_id, poin_detail.sub_material_id)
            .await?;
        Ok(PoinCompletion { poin, sub_material })
    }

    pub async fn mark_poin_scrolled(&self, user_id: Uuid, poin_id: Uuid) -> ServiceResult<ScrollCompletion> {
        let poin = self.poin(poin_id).await?;
        let outcome = self.store.mark_poin_scrolled(user_id, poin.id).await?;
        if outcome.already_completed {
            info!(%user_id, %poin_id, "Poin already scroll-completed");
        } else {
            info!(%user_id, %poin_id, "Poin scroll-completed");
        }
        Ok(ScrollCompletion {
            already_completed: outcome.already_completed,
            scroll_completed_at: outcome.progress.scroll_completed_at,
        })
    }

    pub async fn poin_scroll_status(&self, user_id: Uuid, poin_id: Uuid) -> ServiceResult<ScrollStatus> {
        let poin = self.poin(poin_id).await?;
        let row = self.store.find_poin_progress(user_id, poin.id).await?;
        Ok(ScrollStatus {
            scroll_completed: row.as_ref().map(|p| p.scroll_completed).unwrap_or(false),
            scroll_completed_at: row.and_then(|p| p.scroll_completed_at),
        })
    }

    /// Summary over the ten most recent completed attempts
    pub async fn quiz_progress(&self, user_id: Uuid, quiz_id: Uuid) -> ServiceResult<QuizProgress> {
        self.store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Quiz".to_string()))?;

        let attempts: Vec<QuizAttempt> = self
            .store
            .list_attempts(user_id, Some(quiz_id))
            .await?
            .into_iter()
            .filter(|a| a.is_completed())
            .take(10)
            .collect();

        let best_score = attempts
            .iter()
            .filter_map(|a| a.score)
            .fold(0.0_f64, f64::max);

        Ok(QuizProgress {
            quiz_id,
            attempts_count: attempts.len(),
            best_score,
            passed: attempts.iter().any(|a| a.passed),
            last_attempt: attempts.first().cloned(),
            recent_attempts: attempts.iter().take(5).cloned().collect(),
        })
    }

    pub async fn user_stats(&self, user_id: Uuid) -> ServiceResult<UserStats> {
        let total_modules = self.store.list_published_modules().await?.len();
        let completed_modules = self
            .store
            .list_module_progress(user_id)
            .await?
            .iter()
            .filter(|p| p.status == ModuleStatus::Completed)
            .count();
        let total_materials = self.store.count_published_sub_materials().await? as usize;
        let completed_materials = self
            .store
            .list_sub_material_progress(user_id)
            .await?
            .iter()
            .filter(|p| p.is_completed)
            .count();

        let attempts: Vec<QuizAttempt> = self
            .store
            .list_attempts(user_id, None)
            .await?
            .into_iter()
            .filter(|a| a.is_completed())
            .collect();
        let passed_quizzes = attempts.iter().filter(|a| a.passed).count();
        let average = if attempts.is_empty() {
            0.0
        } else {
            attempts.iter().map(|a| a.score.unwrap_or(0.0)).sum::<f64>() / attempts.len() as f64
        };

        Ok(UserStats {
            total_modules,
            completed_modules,
            module_completion_rate: percentage(completed_modules, total_modules),
            total_materials,
            completed_materials,
            material_completion_rate: percentage(completed_materials, total_materials),
            total_quiz_attempts: attempts.len(),
            passed_quizzes,
            average_quiz_score: average.round() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::seed::{completed_attempt, demo_catalog, DemoCatalog};
    use crate::database::{MemoryStore, ProgressStore};

    async fn setup() -> (Arc<MemoryStore>, ProgressService, DemoCatalog) {
        let store = Arc::new(MemoryStore::new());
        let demo = demo_catalog(&store).await;
        let service = ProgressService::new(store.clone());
        (store, service, demo)
    }

    #[tokio::test]
    async fn first_module_visit_creates_rows() {
        let (store, service, demo) = setup().await;
        let view = service.module_progress(demo.learner_id, demo.module_id).await.unwrap();
        assert_eq!(view.progress.status, ModuleStatus::NotStarted);
        assert!(view.sub_materis[0].is_unlocked);
        assert!(!view.sub_materis[1].is_unlocked);

        let first = store.find_sub_material_progress(demo.learner_id, demo.sub_a).await.unwrap().unwrap();
        assert!(first.is_unlocked);
        assert!(store.find_module_progress(demo.learner_id, demo.module_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn completing_sub_material_unlocks_next_and_rolls_up() {
        let (_, service, demo) = setup().await;
        let done = service.complete_sub_material(demo.learner_id, demo.sub_a).await.unwrap();
        assert_eq!(done.next_unlocked, Some(demo.sub_b));
        assert_eq!(done.module.progress_percent, 50);

        let access = service.check_access(demo.learner_id, demo.sub_b).await.unwrap();
        assert!(access.can_access);
        assert_eq!(access.reason, ACCESS_GRANTED);
    }

    #[tokio::test]
    async fn second_sub_material_starts_locked() {
        let (_, service, demo) = setup().await;
        let access = service.check_access(demo.learner_id, demo.sub_b).await.unwrap();
        assert!(!access.can_access);
        assert_eq!(access.reason, ACCESS_LOCKED);

        let view = service.sub_material_progress(demo.learner_id, demo.sub_b).await.unwrap();
        assert!(!view.is_unlocked);
        let view = service.sub_material_progress(demo.learner_id, demo.sub_a).await.unwrap();
        assert!(view.is_unlocked);
        assert_eq!(view.poins.len(), 1);
    }

    #[tokio::test]
    async fn unknown_poin_writes_nothing() {
        let (store, service, demo) = setup().await;
        let err = service.complete_poin(demo.learner_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(store.list_poin_progress(demo.learner_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn poin_completion_updates_reading_percent() {
        let (_, service, demo) = setup().await;
        let done = service.complete_poin(demo.learner_id, demo.poin_a).await.unwrap();
        assert!(done.poin.is_completed);
        assert_eq!(done.sub_material.progress_percent, 100);
        assert_eq!(done.sub_material.current_poin_index, 1);
    }

    #[tokio::test]
    async fn scroll_completion_is_reported_once() {
        let (_, service, demo) = setup().await;
        let before = service.poin_scroll_status(demo.learner_id, demo.poin_b).await.unwrap();
        assert!(!before.scroll_completed);

        let first = service.mark_poin_scrolled(demo.learner_id, demo.poin_b).await.unwrap();
        let second = service.mark_poin_scrolled(demo.learner_id, demo.poin_b).await.unwrap();
        assert!(!first.already_completed);
        assert!(second.already_completed);
        assert_eq!(first.scroll_completed_at, second.scroll_completed_at);
    }

    #[tokio::test]
    async fn quiz_progress_and_stats_ignore_open_attempts() {
        let (store, service, demo) = setup().await;
        store.start_attempt(demo.learner_id, demo.quiz_module, 4).await.unwrap();
        store.insert_attempt(completed_attempt(demo.learner_id, demo.quiz_module, 50.0, false)).await;
        store.insert_attempt(completed_attempt(demo.learner_id, demo.quiz_module, 75.0, true)).await;

        let progress = service.quiz_progress(demo.learner_id, demo.quiz_module).await.unwrap();
        assert_eq!(progress.attempts_count, 2);
        assert_eq!(progress.best_score, 75.0);
        assert!(progress.passed);

        let stats = service.user_stats(demo.learner_id).await.unwrap();
        assert_eq!(stats.total_quiz_attempts, 2);
        assert_eq!(stats.passed_quizzes, 1);
        assert_eq!(stats.average_quiz_score, 63); // 62.5 rounds up
        assert_eq!(stats.total_modules, 1);
        assert_eq!(stats.total_materials, 2);
    }

    #[tokio::test]
    async fn overview_counts_published_modules() {
        let (_, service, demo) = setup().await;
        service.complete_sub_material(demo.learner_id, demo.sub_a).await.unwrap();
        service.complete_sub_material(demo.learner_id, demo.sub_b).await.unwrap();

        let overview = service.modules_overview(demo.learner_id).await.unwrap();
        assert_eq!(overview.modules.len(), 1);
        assert!(overview.modules[0].completed);
        assert_eq!(overview.overall_progress.percentage, 100);
    }
}
