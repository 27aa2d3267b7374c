use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::database::models::{SubMaterial, SubMaterialProgress};
use crate::database::Store;

/// Reported lock/completion state of one sub-material for one user
#[derive(Debug, Clone, Serialize)]
pub struct SubMaterialState {
    pub id: Uuid,
    pub title: String,
    pub order_index: i32,
    pub is_unlocked: bool,
    pub is_completed: bool,
    pub progress_percent: i32,
    pub total_poins: usize,
    pub current_poin_index: i32,
}

/// Sequential gate over the sub-materials of a module
#[derive(Clone)]
pub struct UnlockEngine {
    store: Arc<dyn Store>,
}

impl UnlockEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Walk adjacent pairs in order: a completed sub-material unlocks the next
    /// one, an unfinished one re-locks the next unless that one is completed.
    /// Returns the resulting state with the first sub-material always unlocked.
    pub async fn evaluate(&self, user_id: Uuid, module_id: Uuid) -> ServiceResult<Vec<SubMaterialState>> {
        self.store
            .find_module(module_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Module".to_string()))?;

        let subs = self.store.list_sub_materials(module_id).await?;
        let mut rows: HashMap<Uuid, SubMaterialProgress> = self
            .store
            .list_sub_material_progress(user_id)
            .await?
            .into_iter()
            .map(|row| (row.sub_material_id, row))
            .collect();

        for pair in subs.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let current_done = rows.get(&current.id).map(|r| r.is_completed).unwrap_or(false);
            let next_unlocked = rows.get(&next.id).map(|r| r.is_unlocked).unwrap_or(false);

            if current_done {
                if !next_unlocked {
                    let row = self.store.unlock_sub_material(user_id, next.id).await?;
                    info!(%user_id, sub_material_id = %next.id, "Unlocked sub-material after completed predecessor");
                    rows.insert(next.id, row);
                }
            } else if self.store.lock_sub_material(user_id, next.id).await? {
                info!(%user_id, sub_material_id = %next.id, "Locked sub-material behind unfinished predecessor");
                if let Some(row) = rows.get_mut(&next.id) {
                    row.is_unlocked = false;
                }
            } else {
                debug!(%user_id, sub_material_id = %next.id, "Sub-material lock state unchanged");
            }
        }

        self.snapshot(&subs, &rows).await
    }

    /// Unlock the sub-material right after `completed_sub_material_id`.
    /// Returns `None` when the completed one is last in its module.
    pub async fn unlock_next(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        completed_sub_material_id: Uuid,
    ) -> ServiceResult<Option<SubMaterialProgress>> {
        let completed = self
            .store
            .find_sub_material(completed_sub_material_id)
            .await?
            .filter(|s| s.module_id == module_id)
            .ok_or_else(|| ServiceError::NotFound("Sub-material".to_string()))?;

        let Some(next) = self
            .store
            .find_sub_material_at(module_id, completed.order_index + 1)
            .await?
        else {
            debug!(%user_id, %module_id, "Completed sub-material is last in module");
            return Ok(None);
        };

        let row = self.store.unlock_sub_material(user_id, next.id).await?;
        info!(%user_id, sub_material_id = %next.id, "Unlocked next sub-material");
        Ok(Some(row))
    }

    async fn snapshot(
        &self,
        subs: &[SubMaterial],
        rows: &HashMap<Uuid, SubMaterialProgress>,
    ) -> ServiceResult<Vec<SubMaterialState>> {
        let poin_counts = try_join_all(subs.iter().map(|s| self.store.list_poins(s.id))).await?;

        Ok(subs
            .iter()
            .zip(poin_counts)
            .enumerate()
            .map(|(i, (sub, poins))| {
                let row = rows.get(&sub.id);
                SubMaterialState {
                    id: sub.id,
                    title: sub.title.clone(),
                    order_index: sub.order_index,
                    is_unlocked: i == 0 || row.map(|r| r.is_unlocked).unwrap_or(false),
                    is_completed: row.map(|r| r.is_completed).unwrap_or(false),
                    progress_percent: row.map(|r| r.progress_percent).unwrap_or(0),
                    total_poins: poins.len(),
                    current_poin_index: row.map(|r| r.current_poin_index).unwrap_or(0),
                }
            })
            .collect())
    }
}

/// True when `sub` has the lowest order index of its module
pub async fn is_first_in_module(store: &dyn Store, sub: &SubMaterial) -> ServiceResult<bool> {
    let subs = store.list_sub_materials(sub.module_id).await?;
    Ok(subs.first().map(|first| first.id == sub.id).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::seed::{demo_catalog, DemoCatalog};
    use crate::database::{MemoryStore, ProgressStore};

    async fn setup() -> (Arc<MemoryStore>, UnlockEngine, DemoCatalog) {
        let store = Arc::new(MemoryStore::new());
        let demo = demo_catalog(&store).await;
        let engine = UnlockEngine::new(store.clone());
        (store, engine, demo)
    }

    #[tokio::test]
    async fn first_sub_material_reports_unlocked_without_rows() {
        let (_, engine, demo) = setup().await;
        let state = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        assert_eq!(state.len(), 2);
        assert!(state[0].is_unlocked);
        assert!(!state[1].is_unlocked);
        assert_eq!(state[0].total_poins, 1);
    }

    #[tokio::test]
    async fn completed_predecessor_unlocks_next() {
        let (store, engine, demo) = setup().await;
        store.complete_sub_material(demo.learner_id, demo.sub_a).await.unwrap();

        let state = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        assert!(state[1].is_unlocked);
        let row = store.find_sub_material_progress(demo.learner_id, demo.sub_b).await.unwrap().unwrap();
        assert!(row.is_unlocked);
        assert!(!row.is_completed);
    }

    #[tokio::test]
    async fn unfinished_predecessor_relocks_next() {
        let (store, engine, demo) = setup().await;
        store.unlock_sub_material(demo.learner_id, demo.sub_b).await.unwrap();

        let state = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        assert!(!state[1].is_unlocked);
    }

    #[tokio::test]
    async fn relock_skips_completed_next() {
        let (store, engine, demo) = setup().await;
        store.complete_sub_material(demo.learner_id, demo.sub_b).await.unwrap();

        let state = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        assert!(state[1].is_unlocked);
        assert!(state[1].is_completed);
    }

    #[tokio::test]
    async fn evaluate_is_idempotent() {
        let (store, engine, demo) = setup().await;
        store.complete_sub_material(demo.learner_id, demo.sub_a).await.unwrap();

        let first = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        let second = engine.evaluate(demo.learner_id, demo.module_id).await.unwrap();
        let flags = |s: &[SubMaterialState]| s.iter().map(|x| (x.is_unlocked, x.is_completed)).collect::<Vec<_>>();
        assert_eq!(flags(&first), flags(&second));
    }

    #[tokio::test]
    async fn unknown_module_is_not_found_and_writes_nothing() {
        let (store, engine, demo) = setup().await;
        let err = engine.evaluate(demo.learner_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(store.list_sub_material_progress(demo.learner_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlock_next_stops_at_last() {
        let (store, engine, demo) = setup().await;
        let unlocked = engine.unlock_next(demo.learner_id, demo.module_id, demo.sub_a).await.unwrap();
        assert_eq!(unlocked.map(|r| r.sub_material_id), Some(demo.sub_b));

        let none = engine.unlock_next(demo.learner_id, demo.module_id, demo.sub_b).await.unwrap();
        assert!(none.is_none());
        assert_eq!(store.list_sub_material_progress(demo.learner_id).await.unwrap().len(), 1);
    }
}
