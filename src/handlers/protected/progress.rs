use axum::{
    extract::{rejection::PathRejection, Path, State},
    Extension,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::progress::{
    MaterialAccess, ModuleProgressView, ModulesOverview, PoinCompletion, QuizProgress, ScrollCompletion,
    ScrollStatus, SubMaterialCompletion, SubMaterialProgressView, UserStats,
};

/// GET /api/v1/progress/modules
pub async fn modules(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<ModulesOverview> {
    Ok(ApiResponse::success(state.progress.modules_overview(user.user_id).await?))
}

/// GET /api/v1/progress/modules/:id - also runs the unlock evaluation
pub async fn module(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ModuleProgressView> {
    let Path(module_id) = path?;
    Ok(ApiResponse::success(state.progress.module_progress(user.user_id, module_id).await?))
}

/// GET /api/v1/progress/sub-materis/:id
pub async fn sub_material(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<SubMaterialProgressView> {
    let Path(sub_material_id) = path?;
    Ok(ApiResponse::success(
        state.progress.sub_material_progress(user.user_id, sub_material_id).await?,
    ))
}

/// POST /api/v1/progress/sub-materis/:id/complete
pub async fn complete_sub_material(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<SubMaterialCompletion> {
    let Path(sub_material_id) = path?;
    let completion = state.progress.complete_sub_material(user.user_id, sub_material_id).await?;
    Ok(ApiResponse::with_message(completion, "SUB_MATERI_COMPLETED", "Sub-materi completed"))
}

/// GET /api/v1/progress/materials/:id/access
pub async fn access(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<MaterialAccess> {
    let Path(sub_material_id) = path?;
    Ok(ApiResponse::success(state.progress.check_access(user.user_id, sub_material_id).await?))
}

/// POST /api/v1/progress/poins/:id/complete
pub async fn complete_poin(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<PoinCompletion> {
    let Path(poin_id) = path?;
    let completion = state.progress.complete_poin(user.user_id, poin_id).await?;
    Ok(ApiResponse::with_message(completion, "POIN_COMPLETED", "Poin completed"))
}

/// POST /api/v1/progress/poins/:id/scroll-complete
pub async fn scroll_complete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ScrollCompletion> {
    let Path(poin_id) = path?;
    let outcome = state.progress.mark_poin_scrolled(user.user_id, poin_id).await?;
    let message = if outcome.already_completed { "Poin already scrolled" } else { "Poin scroll completed" };
    Ok(ApiResponse::with_message(outcome, "POIN_SCROLLED", message))
}

/// GET /api/v1/progress/poins/:id/scroll-status
pub async fn scroll_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ScrollStatus> {
    let Path(poin_id) = path?;
    Ok(ApiResponse::success(state.progress.poin_scroll_status(user.user_id, poin_id).await?))
}

/// GET /api/v1/progress/quiz/:id
pub async fn quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<QuizProgress> {
    let Path(quiz_id) = path?;
    Ok(ApiResponse::success(state.progress.quiz_progress(user.user_id, quiz_id).await?))
}

/// GET /api/v1/progress/stats
pub async fn stats(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<UserStats> {
    Ok(ApiResponse::success(state.progress.user_stats(user.user_id).await?))
}
