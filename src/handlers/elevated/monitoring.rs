use axum::extract::{rejection::PathRejection, rejection::QueryRejection, Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::config;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::monitoring::{
    ModuleCompletionStat, MonitoringStats, ReadingProgressEntry, StuckUser, UserDetail, UserListQuery,
    UserProgressPage,
};
use crate::types::StatusFilter;

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl UsersQuery {
    /// Fill paging defaults from config and clamp the page size
    fn resolve(self) -> UserListQuery {
        let api = &config::config().api;
        let limit = self
            .limit
            .unwrap_or(api.default_page_size as usize)
            .clamp(1, api.max_page_size as usize);

        UserListQuery {
            search: self.search.filter(|s| !s.trim().is_empty()),
            status: self.status,
            page: self.page.unwrap_or(1).max(1),
            limit,
        }
    }
}

/// GET /api/v1/admin/progress-monitoring/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<MonitoringStats> {
    Ok(ApiResponse::success(state.monitoring.stats().await?))
}

/// GET /api/v1/admin/progress-monitoring/users
pub async fn users(
    State(state): State<AppState>,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> ApiResult<UserProgressPage> {
    let Query(query) = query?;
    Ok(ApiResponse::success(state.monitoring.user_progress_list(query.resolve()).await?))
}

/// GET /api/v1/admin/progress-monitoring/users/:userId
pub async fn user_detail(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<UserDetail> {
    let Path(user_id) = path?;
    Ok(ApiResponse::success(state.monitoring.user_detail(user_id).await?))
}

/// GET /api/v1/admin/progress-monitoring/module-stats
pub async fn module_stats(State(state): State<AppState>) -> ApiResult<Vec<ModuleCompletionStat>> {
    Ok(ApiResponse::success(state.monitoring.module_completion_stats().await?))
}

/// GET /api/v1/admin/progress-monitoring/stuck-users/:moduleId
pub async fn stuck_users(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<StuckUser>> {
    let Path(module_id) = path?;
    Ok(ApiResponse::success(state.monitoring.stuck_users(module_id).await?))
}

/// GET /api/v1/admin/progress-monitoring/reading-progress
pub async fn reading_progress(State(state): State<AppState>) -> ApiResult<Vec<ReadingProgressEntry>> {
    Ok(ApiResponse::success(state.monitoring.reading_progress().await?))
}
