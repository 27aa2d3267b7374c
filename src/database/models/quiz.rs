use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A quiz is module-level when `sub_material_id` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub module_id: Uuid,
    pub sub_material_id: Option<Uuid>,
    pub title: Option<String>,
    pub time_limit_seconds: i32,
    pub passing_score: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub question_text: String,
    pub options: Json<Vec<String>>,
    pub correct_answer_index: i32,
    pub explanation: Option<String>,
    pub order_index: i32,
}

/// Graded answer as stored on a completed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: Uuid,
    pub selected_option_index: i32,
    /// `None` when the question id did not belong to the quiz
    pub correct_answer_index: Option<i32>,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub score: Option<f64>,
    pub total_questions: i32,
    pub correct_answers: Option<i32>,
    pub passed: bool,
    pub answers: Json<Vec<AnswerRecord>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QuizAttempt {
    /// Fresh attempt with no score yet
    pub fn open(user_id: Uuid, quiz_id: Uuid, total_questions: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            user_id,
            score: None,
            total_questions,
            correct_answers: None,
            passed: false,
            answers: Json(Vec::new()),
            started_at: now,
            completed_at: None,
            created_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}
