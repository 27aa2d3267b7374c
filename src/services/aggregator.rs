use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{percentage, ServiceError, ServiceResult};
use crate::database::models::{ModuleProgress, SubMaterialProgress};
use crate::database::Store;
use crate::types::ModuleStatus;

/// Bottom-up percentage rollups. Both operations only read child state, so
/// re-running them without intervening changes stores the same values.
#[derive(Clone)]
pub struct ProgressAggregator {
    store: Arc<dyn Store>,
}

impl ProgressAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Percent of completed poins; the poin cursor equals the completed count.
    pub async fn update_sub_material_progress(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
    ) -> ServiceResult<SubMaterialProgress> {
        self.store
            .find_sub_material(sub_material_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sub-material".to_string()))?;

        let poins = self.store.list_poins(sub_material_id).await?;
        let done: HashSet<Uuid> = self
            .store
            .list_poin_progress(user_id)
            .await?
            .into_iter()
            .filter(|p| p.is_completed)
            .map(|p| p.poin_id)
            .collect();
        let completed = poins.iter().filter(|p| done.contains(&p.id)).count();
        let percent = percentage(completed, poins.len());

        debug!(%user_id, %sub_material_id, completed, total = poins.len(), percent, "Recomputed sub-material progress");
        let row = self
            .store
            .save_sub_material_reading(user_id, sub_material_id, percent, completed as i32)
            .await?;
        Ok(row)
    }

    /// Percent of completed sub-materials with the status derived from it.
    /// `completed_at` survives recomputation while the module stays completed.
    pub async fn update_module_progress(&self, user_id: Uuid, module_id: Uuid) -> ServiceResult<ModuleProgress> {
        self.store
            .find_module(module_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Module".to_string()))?;

        let subs = self.store.list_sub_materials(module_id).await?;
        let done: HashSet<Uuid> = self
            .store
            .list_sub_material_progress(user_id)
            .await?
            .into_iter()
            .filter(|p| p.is_completed)
            .map(|p| p.sub_material_id)
            .collect();
        let completed = subs.iter().filter(|s| done.contains(&s.id)).count();
        let percent = percentage(completed, subs.len());
        let status = ModuleStatus::from_percent(percent);

        let completed_at = match status {
            ModuleStatus::Completed => {
                let previous = self.store.find_module_progress(user_id, module_id).await?;
                Some(previous.and_then(|p| p.completed_at).unwrap_or_else(Utc::now))
            }
            _ => None,
        };

        debug!(%user_id, %module_id, completed, total = subs.len(), percent, status = status.as_str(), "Recomputed module progress");
        let row = self
            .store
            .save_module_progress(user_id, module_id, percent, status, completed_at)
            .await?;
        Ok(row)
    }
}
