use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, rejection::QueryRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::QuizAttempt;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::quiz::{QuizDetail, QuizResult, QuizSummary, StartQuizRequest, StartedQuiz, SubmitQuizRequest};

#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    #[serde(alias = "quizId")]
    pub quiz_id: Option<Uuid>,
}

/// POST /api/v1/quizzes/start - start or resume the caller's open attempt
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<StartQuizRequest>, JsonRejection>,
) -> ApiResult<StartedQuiz> {
    let Json(request) = body?;
    let quiz_id = request
        .quiz_id
        .ok_or_else(|| ApiError::field_error("quiz_id", "quiz_id is required"))?;

    let started = state.quizzes.start(user.user_id, quiz_id).await?;
    let message = if started.is_existing { "Resuming existing quiz attempt" } else { "Quiz started" };
    Ok(ApiResponse::with_message(started, "QUIZ_STARTED", message))
}

/// POST /api/v1/quizzes/submit - grade answers and record a completed attempt
pub async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SubmitQuizRequest>, JsonRejection>,
) -> ApiResult<QuizResult> {
    let Json(request) = body?;
    let result = state.quizzes.submit(user.user_id, request).await?;
    let message = if result.passed { "Quiz passed" } else { "Quiz submitted" };
    Ok(ApiResponse::with_message(result, "QUIZ_SUBMITTED", message))
}

/// GET /api/v1/quizzes/:id
pub async fn show(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<QuizDetail> {
    let Path(quiz_id) = path?;
    Ok(ApiResponse::success(state.quizzes.quiz_detail(quiz_id).await?))
}

/// GET /api/v1/quizzes/module/:moduleId
pub async fn by_module(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<QuizSummary>> {
    let Path(module_id) = path?;
    Ok(ApiResponse::success(state.quizzes.quizzes_for_module(module_id).await?))
}

/// GET /api/v1/quizzes/attempts/me
pub async fn my_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AttemptsQuery>, QueryRejection>,
) -> ApiResult<Vec<QuizAttempt>> {
    let Query(query) = query?;
    Ok(ApiResponse::success(
        state.quizzes.attempt_history(user.user_id, query.quiz_id).await?,
    ))
}
