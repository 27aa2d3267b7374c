use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ProgressAggregator, ServiceError, ServiceResult, UnlockEngine};
use crate::database::models::{AnswerRecord, Quiz, QuizAttempt, QuizQuestion};
use crate::database::Store;

#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    #[serde(alias = "quizId")]
    pub quiz_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: Uuid,
    pub selected_option_index: i32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    #[serde(alias = "quizId")]
    pub quiz_id: Uuid,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Serialize)]
pub struct StartedQuiz {
    pub attempt_id: Uuid,
    pub quiz_id: Uuid,
    pub total_questions: i32,
    pub time_limit_seconds: i32,
    pub started_at: DateTime<Utc>,
    pub is_existing: bool,
}

#[derive(Debug, Serialize)]
pub struct QuizResult {
    pub attempt_id: Uuid,
    pub score: f64,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub passed: bool,
    pub passing_score: i32,
    pub answers: Vec<AnswerRecord>,
}

/// Quiz as shown to a learner: questions without their answer key
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    pub id: Uuid,
    pub module_id: Uuid,
    pub sub_material_id: Option<Uuid>,
    pub title: Option<String>,
    pub time_limit_seconds: i32,
    pub passing_score: i32,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub order_index: i32,
}

#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub sub_material_id: Option<Uuid>,
    pub time_limit_seconds: i32,
    pub passing_score: i32,
    pub total_questions: usize,
}

/// Outcome of grading one submission
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub answers: Vec<AnswerRecord>,
    pub correct_answers: i32,
    pub score: f64,
    pub passed: bool,
}

/// Grade answers against the full question list. Unanswered questions count
/// as wrong and an empty quiz scores 0.
pub fn grade(questions: &[QuizQuestion], submitted: &[SubmittedAnswer], passing_score: i32) -> Grade {
    let by_id: HashMap<Uuid, &QuizQuestion> = questions.iter().map(|q| (q.id, q)).collect();

    let answers: Vec<AnswerRecord> = submitted
        .iter()
        .map(|answer| match by_id.get(&answer.question_id) {
            Some(question) => AnswerRecord {
                question_id: answer.question_id,
                selected_option_index: answer.selected_option_index,
                correct_answer_index: Some(question.correct_answer_index),
                is_correct: question.correct_answer_index == answer.selected_option_index,
                explanation: question.explanation.clone(),
            },
            None => AnswerRecord {
                question_id: answer.question_id,
                selected_option_index: answer.selected_option_index,
                correct_answer_index: None,
                is_correct: false,
                explanation: None,
            },
        })
        .collect();

    let correct_answers = answers.iter().filter(|a| a.is_correct).count() as i32;
    let score = if questions.is_empty() {
        0.0
    } else {
        100.0 * correct_answers as f64 / questions.len() as f64
    };

    Grade {
        answers,
        correct_answers,
        score,
        passed: score >= passing_score as f64,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn validate_answers(answers: &[SubmittedAnswer]) -> ServiceResult<()> {
    let mut seen = HashSet::new();
    for answer in answers {
        if answer.selected_option_index < 0 {
            return Err(ServiceError::Validation(format!(
                "selected_option_index for question {} must not be negative",
                answer.question_id
            )));
        }
        if !seen.insert(answer.question_id) {
            return Err(ServiceError::Validation(format!(
                "question {} answered more than once",
                answer.question_id
            )));
        }
    }
    Ok(())
}

/// Starts and grades attempts; a pass on a sub-material quiz completes that
/// sub-material and moves the module forward.
#[derive(Clone)]
pub struct QuizService {
    store: Arc<dyn Store>,
    aggregator: ProgressAggregator,
    unlock: UnlockEngine,
}

impl QuizService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            aggregator: ProgressAggregator::new(store.clone()),
            unlock: UnlockEngine::new(store.clone()),
            store,
        }
    }

    async fn published_quiz(&self, quiz_id: Uuid) -> ServiceResult<Quiz> {
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Quiz".to_string()))?;
        if !quiz.published {
            return Err(ServiceError::Conflict("Quiz is not published".to_string()));
        }
        Ok(quiz)
    }

    /// Resume the open attempt for (user, quiz) or open a new one
    pub async fn start(&self, user_id: Uuid, quiz_id: Uuid) -> ServiceResult<StartedQuiz> {
        let quiz = self.published_quiz(quiz_id).await?;
        let questions = self.store.list_questions(quiz.id).await?;

        let started = self
            .store
            .start_attempt(user_id, quiz.id, questions.len() as i32)
            .await?;

        if started.existing {
            info!(%user_id, %quiz_id, attempt_id = %started.attempt.id, "Resumed open quiz attempt");
        } else {
            info!(%user_id, %quiz_id, attempt_id = %started.attempt.id, "Started quiz attempt");
        }

        Ok(StartedQuiz {
            attempt_id: started.attempt.id,
            quiz_id: quiz.id,
            total_questions: started.attempt.total_questions,
            time_limit_seconds: quiz.time_limit_seconds,
            started_at: started.attempt.started_at,
            is_existing: started.existing,
        })
    }

    /// Grade and store a new completed attempt. Open attempts from `start` are
    /// left as they are.
    pub async fn submit(&self, user_id: Uuid, request: SubmitQuizRequest) -> ServiceResult<QuizResult> {
        validate_answers(&request.answers)?;
        let quiz = self.published_quiz(request.quiz_id).await?;
        let questions = self.store.list_questions(quiz.id).await?;

        let graded = grade(&questions, &request.answers, quiz.passing_score);
        let score = round2(graded.score);
        let now = Utc::now();

        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            quiz_id: quiz.id,
            user_id,
            score: Some(score),
            total_questions: questions.len() as i32,
            correct_answers: Some(graded.correct_answers),
            passed: graded.passed,
            answers: Json(graded.answers),
            started_at: now,
            completed_at: Some(now),
            created_at: now,
        };
        let attempt = self.store.insert_completed_attempt(attempt).await?;

        info!(
            %user_id,
            quiz_id = %quiz.id,
            attempt_id = %attempt.id,
            score,
            passed = attempt.passed,
            "Quiz submitted"
        );

        if attempt.passed {
            if let Some(sub_material_id) = quiz.sub_material_id {
                self.cascade_completion(user_id, sub_material_id).await;
            }
        }

        Ok(QuizResult {
            attempt_id: attempt.id,
            score,
            total_questions: attempt.total_questions,
            correct_answers: graded.correct_answers,
            passed: attempt.passed,
            passing_score: quiz.passing_score,
            answers: attempt.answers.0,
        })
    }

    /// The attempt is already stored, so failures here are logged only
    async fn cascade_completion(&self, user_id: Uuid, sub_material_id: Uuid) {
        if let Err(err) = self.try_cascade(user_id, sub_material_id).await {
            error!(%user_id, %sub_material_id, error = %err, "Quiz pass cascade failed");
        }
    }

    async fn try_cascade(&self, user_id: Uuid, sub_material_id: Uuid) -> ServiceResult<()> {
        let sub = self
            .store
            .find_sub_material(sub_material_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Sub-material".to_string()))?;
        let poin_ids: Vec<Uuid> = self
            .store
            .list_poins(sub.id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        self.store
            .complete_sub_material_content(user_id, sub.id, &poin_ids)
            .await?;
        let module = self.aggregator.update_module_progress(user_id, sub.module_id).await?;
        self.unlock.unlock_next(user_id, sub.module_id, sub.id).await?;

        info!(
            %user_id,
            sub_material_id = %sub.id,
            module_id = %sub.module_id,
            module_percent = module.progress_percent,
            "Completed sub-material from passed quiz"
        );
        Ok(())
    }

    pub async fn quiz_detail(&self, quiz_id: Uuid) -> ServiceResult<QuizDetail> {
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .filter(|q| q.published)
            .ok_or_else(|| ServiceError::NotFound("Quiz".to_string()))?;
        let questions = self.store.list_questions(quiz.id).await?;

        Ok(QuizDetail {
            id: quiz.id,
            module_id: quiz.module_id,
            sub_material_id: quiz.sub_material_id,
            title: quiz.title,
            time_limit_seconds: quiz.time_limit_seconds,
            passing_score: quiz.passing_score,
            questions: questions
                .into_iter()
                .map(|q| PublicQuestion {
                    id: q.id,
                    question_text: q.question_text,
                    options: q.options.0,
                    order_index: q.order_index,
                })
                .collect(),
        })
    }

    pub async fn quizzes_for_module(&self, module_id: Uuid) -> ServiceResult<Vec<QuizSummary>> {
        self.store
            .find_module(module_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Module".to_string()))?;

        let mut summaries = Vec::new();
        for quiz in self.store.list_quizzes_by_module(module_id).await? {
            if !quiz.published {
                continue;
            }
            let total_questions = self.store.list_questions(quiz.id).await?.len();
            summaries.push(QuizSummary {
                id: quiz.id,
                title: quiz.title,
                sub_material_id: quiz.sub_material_id,
                time_limit_seconds: quiz.time_limit_seconds,
                passing_score: quiz.passing_score,
                total_questions,
            });
        }
        Ok(summaries)
    }

    /// Caller's own attempts, newest first
    pub async fn attempt_history(&self, user_id: Uuid, quiz_id: Option<Uuid>) -> ServiceResult<Vec<QuizAttempt>> {
        if let Some(quiz_id) = quiz_id {
            if self.store.find_quiz(quiz_id).await?.is_none() {
                warn!(%user_id, %quiz_id, "Attempt history requested for unknown quiz");
                return Err(ServiceError::NotFound("Quiz".to_string()));
            }
        }
        Ok(self.store.list_attempts(user_id, quiz_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::seed::{demo_catalog, DemoCatalog};
    use crate::database::{MemoryStore, ProgressStore};
    use crate::types::ModuleStatus;

    fn question(correct: i32) -> QuizQuestion {
        QuizQuestion {
            id: Uuid::new_v4(),
            quiz_id: Uuid::nil(),
            question_text: "?".to_string(),
            options: Json(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            correct_answer_index: correct,
            explanation: Some("because".to_string()),
            order_index: 0,
        }
    }

    fn answer(q: &QuizQuestion, selected: i32) -> SubmittedAnswer {
        SubmittedAnswer { question_id: q.id, selected_option_index: selected }
    }

    fn answers_for(key: &[(Uuid, i32)], correct: usize) -> Vec<SubmittedAnswer> {
        key.iter()
            .enumerate()
            .map(|(i, (id, right))| SubmittedAnswer {
                question_id: *id,
                selected_option_index: if i < correct { *right } else { (*right + 1) % 4 },
            })
            .collect()
    }

    #[test]
    fn three_of_four_passes_at_seventy() {
        let qs: Vec<_> = (0..4).map(|_| question(2)).collect();
        let submitted = vec![answer(&qs[0], 2), answer(&qs[1], 2), answer(&qs[2], 2), answer(&qs[3], 0)];
        let g = grade(&qs, &submitted, 70);
        assert_eq!(g.correct_answers, 3);
        assert_eq!(g.score, 75.0);
        assert!(g.passed);
    }

    #[test]
    fn two_of_four_fails_at_seventy() {
        let qs: Vec<_> = (0..4).map(|_| question(1)).collect();
        let g = grade(&qs, &[answer(&qs[0], 1), answer(&qs[1], 1)], 70);
        assert_eq!(g.score, 50.0);
        assert!(!g.passed);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let g = grade(&[], &[], 70);
        assert_eq!(g.score, 0.0);
        assert!(!g.score.is_nan());
        assert!(!g.passed);
    }

    #[test]
    fn unknown_question_is_recorded_as_wrong() {
        let qs = vec![question(0)];
        let stray = SubmittedAnswer { question_id: Uuid::new_v4(), selected_option_index: 0 };
        let g = grade(&qs, &[stray.clone()], 50);
        assert_eq!(g.correct_answers, 0);
        assert_eq!(g.answers[0].correct_answer_index, None);
        assert_eq!(g.answers[0].question_id, stray.question_id);
    }

    #[test]
    fn duplicate_or_negative_answers_are_rejected() {
        let q = question(0);
        assert!(matches!(validate_answers(&[answer(&q, 0), answer(&q, 1)]), Err(ServiceError::Validation(_))));
        assert!(matches!(validate_answers(&[answer(&q, -1)]), Err(ServiceError::Validation(_))));
        assert!(validate_answers(&[answer(&q, 0)]).is_ok());
    }

    #[test]
    fn scores_round_to_two_decimals() {
        assert_eq!(round2(200.0 / 3.0), 66.67);
        assert_eq!(round2(100.0 / 3.0), 33.33);
    }

    async fn setup() -> (Arc<MemoryStore>, QuizService, DemoCatalog) {
        let store = Arc::new(MemoryStore::new());
        let demo = demo_catalog(&store).await;
        let service = QuizService::new(store.clone());
        (store, service, demo)
    }

    #[tokio::test]
    async fn start_returns_existing_open_attempt() {
        let (_, service, demo) = setup().await;
        let first = service.start(demo.learner_id, demo.quiz_module).await.unwrap();
        let second = service.start(demo.learner_id, demo.quiz_module).await.unwrap();
        assert!(!first.is_existing);
        assert!(second.is_existing);
        assert_eq!(first.attempt_id, second.attempt_id);
        assert_eq!(first.total_questions, 4);
        assert_eq!(first.time_limit_seconds, 600);
    }

    #[tokio::test]
    async fn unpublished_and_unknown_quizzes_are_rejected() {
        let (_, service, demo) = setup().await;
        assert!(matches!(
            service.start(demo.learner_id, demo.quiz_draft).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.start(demo.learner_id, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
        let submit = SubmitQuizRequest { quiz_id: demo.quiz_draft, answers: vec![] };
        assert!(matches!(service.submit(demo.learner_id, submit).await, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn submit_leaves_open_attempt_open() {
        let (store, service, demo) = setup().await;
        service.start(demo.learner_id, demo.quiz_module).await.unwrap();
        let request = SubmitQuizRequest { quiz_id: demo.quiz_module, answers: answers_for(&demo.quiz_module_key, 4) };
        service.submit(demo.learner_id, request).await.unwrap();

        let attempts = store.list_attempts(demo.learner_id, Some(demo.quiz_module)).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts.iter().filter(|a| a.is_completed()).count(), 1);
    }

    #[tokio::test]
    async fn passing_sub_material_quiz_cascades() {
        let (store, service, demo) = setup().await;
        let request = SubmitQuizRequest { quiz_id: demo.quiz_a, answers: answers_for(&demo.quiz_a_key, 2) };
        let result = service.submit(demo.learner_id, request).await.unwrap();
        assert_eq!(result.score, 100.0);
        assert!(result.passed);

        let a = store.find_sub_material_progress(demo.learner_id, demo.sub_a).await.unwrap().unwrap();
        assert!(a.is_completed);
        assert_eq!(a.progress_percent, 100);
        assert_eq!(a.current_poin_index, 1);
        assert!(store.find_poin_progress(demo.learner_id, demo.poin_a).await.unwrap().unwrap().is_completed);

        let b = store.find_sub_material_progress(demo.learner_id, demo.sub_b).await.unwrap().unwrap();
        assert!(b.is_unlocked);
        assert!(!b.is_completed);

        let m = store.find_module_progress(demo.learner_id, demo.module_id).await.unwrap().unwrap();
        assert_eq!(m.status, ModuleStatus::InProgress);
        assert_eq!(m.progress_percent, 50);
    }

    #[tokio::test]
    async fn failing_or_module_level_quiz_does_not_cascade() {
        let (store, service, demo) = setup().await;
        let failing = SubmitQuizRequest { quiz_id: demo.quiz_a, answers: answers_for(&demo.quiz_a_key, 1) };
        let result = service.submit(demo.learner_id, failing).await.unwrap();
        assert_eq!(result.score, 50.0);
        assert!(!result.passed);

        let module_quiz = SubmitQuizRequest { quiz_id: demo.quiz_module, answers: answers_for(&demo.quiz_module_key, 4) };
        assert!(service.submit(demo.learner_id, module_quiz).await.unwrap().passed);

        assert!(store.list_sub_material_progress(demo.learner_id).await.unwrap().is_empty());
        assert!(store.find_module_progress(demo.learner_id, demo.module_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_quiz_submission_scores_zero() {
        let (_, service, demo) = setup().await;
        let request = SubmitQuizRequest { quiz_id: demo.quiz_empty, answers: vec![] };
        let result = service.submit(demo.learner_id, request).await.unwrap();
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total_questions, 0);
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn quiz_detail_hides_answers_and_drafts() {
        let (_, service, demo) = setup().await;
        let detail = service.quiz_detail(demo.quiz_module).await.unwrap();
        assert_eq!(detail.questions.len(), 4);
        let json = serde_json::to_value(&detail).unwrap();
        assert!(json["questions"][0].get("correct_answer_index").is_none());

        assert!(matches!(service.quiz_detail(demo.quiz_draft).await, Err(ServiceError::NotFound(_))));
        let listed = service.quizzes_for_module(demo.module_id).await.unwrap();
        assert_eq!(listed.len(), 3);
    }
}
