//! Admin progress monitoring.
//!
//! Views are computed on read from the full completed-attempt history; nothing
//! here is persisted. Filtering, sorting and pagination happen in memory after
//! every learner has been classified.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::classification::{self, AttemptView};
use super::{percentage, ServiceError, ServiceResult};
use crate::database::models::{Module, PoinDetail, PoinProgress, Profile, Quiz, QuizAttempt, QuizQuestion, SubMaterial};
use crate::database::Store;
use crate::types::{LearnerStatus, ModuleStatus, StatusFilter};

const UNTITLED_QUIZ: &str = "Untitled Quiz";
const MISSING_QUESTION: &str = "Pertanyaan tidak ditemukan";
const NOT_AVAILABLE: &str = "Tidak tersedia";
const NOT_ANSWERED: &str = "Tidak dijawab";

#[derive(Debug, Serialize)]
pub struct MonitoringStats {
    pub total_users: usize,
    pub active_users: usize,
    pub struggling_users: usize,
    pub inactive_users: usize,
    /// Learners meeting the strict per-module average bar
    pub high_scoring_users: usize,
}

#[derive(Debug, Serialize)]
pub struct ModuleCompletionStat {
    pub module_id: Uuid,
    pub module_title: String,
    pub total_completions: usize,
    pub total_stuck: usize,
    pub total_started: usize,
    pub completion_rate: i32,
}

#[derive(Debug, Serialize)]
pub struct StuckUser {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub failure_count: usize,
    pub last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub status: StatusFilter,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct ModuleQuizSummary {
    pub module_id: Uuid,
    pub module_title: String,
    pub quizzes_passed: usize,
    pub total_quizzes: usize,
}

#[derive(Debug, Serialize)]
pub struct LearnerSummary {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub user_profil_url: Option<String>,
    pub total_modules: usize,
    pub completed_modules: usize,
    pub in_progress_modules: usize,
    pub not_started_modules: usize,
    pub total_quiz_attempts: usize,
    pub total_quiz_passed: usize,
    pub total_quiz_failed: usize,
    pub unique_quizzes_attempted: usize,
    pub pass_rate: i32,
    pub average_quiz_score: i64,
    pub module_quiz_summary: Vec<ModuleQuizSummary>,
    pub last_activity: Option<DateTime<Utc>>,
    pub status: LearnerStatus,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct UserProgressPage {
    pub items: Vec<LearnerSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct AnswerReview {
    pub question_id: Option<Uuid>,
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// One attempt, or a placeholder for a quiz the learner has not taken
#[derive(Debug, Serialize)]
pub struct QuizAttemptDetail {
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub sub_materi_title: String,
    pub score: f64,
    pub passed: bool,
    pub attempted_at: Option<DateTime<Utc>>,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub answers: Vec<AnswerReview>,
    pub is_attempted: bool,
    pub reading_completed: bool,
    pub reading_percentage: i32,
    pub total_poins: usize,
    pub scroll_completed_poins: usize,
}

#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    pub module_id: Uuid,
    pub module_title: String,
    pub status: ModuleStatus,
    pub total_materials: usize,
    pub quizzes_passed: usize,
    pub total_quizzes: usize,
    pub quiz_attempts: Vec<QuizAttemptDetail>,
    pub last_accessed: Option<DateTime<Utc>>,
    /// Percent of the module's quizzes answered at least once
    pub overall_progress: i32,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub summary: LearnerSummary,
    pub modules_progress: Vec<ModuleDetail>,
}

#[derive(Debug, Serialize)]
pub struct SubMaterialReading {
    pub sub_materi_id: Uuid,
    pub sub_materi_title: String,
    pub total_poins: usize,
    pub read_poins: usize,
    pub scroll_completed_poins: usize,
    pub read_percentage: i32,
}

#[derive(Debug, Serialize)]
pub struct ReadingProgressEntry {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub module_id: Uuid,
    pub module_title: String,
    pub sub_materis: Vec<SubMaterialReading>,
    pub total_poins: usize,
    pub read_poins: usize,
    pub scroll_completed_poins: usize,
    pub read_percentage: i32,
}

struct SubMaterialEntry {
    sub: SubMaterial,
    poins: Vec<PoinDetail>,
}

struct ModuleEntry {
    module: Module,
    quizzes: Vec<Quiz>,
    subs: Vec<SubMaterialEntry>,
}

/// Published modules with their quizzes and content, plus a quiz → module index
/// covering every quiz.
struct Catalog {
    modules: Vec<ModuleEntry>,
    quiz_module: HashMap<Uuid, Uuid>,
}

impl Catalog {
    fn view(&self, attempt: &QuizAttempt) -> AttemptView {
        AttemptView::from_attempt(attempt, self.quiz_module.get(&attempt.quiz_id).copied())
    }

    fn views(&self, attempts: &[QuizAttempt]) -> Vec<AttemptView> {
        attempts.iter().map(|a| self.view(a)).collect()
    }
}

/// Scroll and completion counts of one learner for one sub-material
#[derive(Default, Clone, Copy)]
struct ReadingCounts {
    read: usize,
    scrolled: usize,
}

fn reading_counts(poins: &[PoinDetail], rows: &HashMap<Uuid, &PoinProgress>) -> ReadingCounts {
    poins.iter().fold(ReadingCounts::default(), |mut acc, poin| {
        if let Some(row) = rows.get(&poin.id) {
            acc.read += row.is_completed as usize;
            acc.scrolled += row.scroll_completed as usize;
        }
        acc
    })
}

fn module_status_by_quizzes(answered: usize, total: usize) -> ModuleStatus {
    if total > 0 && answered == total {
        ModuleStatus::Completed
    } else if answered > 0 {
        ModuleStatus::InProgress
    } else {
        ModuleStatus::NotStarted
    }
}

fn option_text(options: &[String], index: i32) -> Option<String> {
    usize::try_from(index).ok().and_then(|i| options.get(i)).cloned()
}

#[derive(Clone)]
pub struct MonitoringService {
    store: Arc<dyn Store>,
}

impl MonitoringService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn quiz_modules(&self) -> ServiceResult<HashMap<Uuid, Uuid>> {
        Ok(self
            .store
            .list_quizzes()
            .await?
            .into_iter()
            .map(|q| (q.id, q.module_id))
            .collect())
    }

    async fn load_catalog(&self) -> ServiceResult<Catalog> {
        let quiz_module = self.quiz_modules().await?;
        let published = self.store.list_published_modules().await?;
        let modules = try_join_all(published.into_iter().map(|module| self.load_module(module))).await?;

        Ok(Catalog { modules, quiz_module })
    }

    async fn load_module(&self, module: Module) -> ServiceResult<ModuleEntry> {
        let quizzes = self.store.list_quizzes_by_module(module.id).await?;
        let mut subs = Vec::new();
        for sub in self.store.list_sub_materials(module.id).await? {
            let poins = self.store.list_poins(sub.id).await?;
            subs.push(SubMaterialEntry { sub, poins });
        }
        Ok(ModuleEntry { module, quizzes, subs })
    }

    /// Completed attempts grouped per user, newest first
    async fn history(&self) -> ServiceResult<HashMap<Uuid, Vec<QuizAttempt>>> {
        let mut by_user: HashMap<Uuid, Vec<QuizAttempt>> = HashMap::new();
        for attempt in self.store.list_completed_attempts().await? {
            by_user.entry(attempt.user_id).or_default().push(attempt);
        }
        for attempts in by_user.values_mut() {
            attempts.reverse();
        }
        Ok(by_user)
    }

    pub async fn stats(&self) -> ServiceResult<MonitoringStats> {
        let catalog = self.load_catalog().await?;
        let history = self.history().await?;
        let learners = self.store.list_learners(None).await?;

        let mut stats = MonitoringStats {
            total_users: learners.len(),
            active_users: 0,
            struggling_users: 0,
            inactive_users: 0,
            high_scoring_users: 0,
        };
        for learner in &learners {
            let views = catalog.views(history.get(&learner.id).map(Vec::as_slice).unwrap_or(&[]));
            match classification::classify(&views) {
                LearnerStatus::Active => stats.active_users += 1,
                LearnerStatus::Struggling => stats.struggling_users += 1,
                LearnerStatus::Inactive => stats.inactive_users += 1,
            }
            if classification::meets_score_bar(&views) {
                stats.high_scoring_users += 1;
            }
        }
        Ok(stats)
    }

    /// Started: attempted any of the module's quizzes. Completed: answered all
    /// of them. Stuck: failed them five or more times.
    pub async fn module_completion_stats(&self) -> ServiceResult<Vec<ModuleCompletionStat>> {
        let catalog = self.load_catalog().await?;
        let history = self.history().await?;
        let learners: HashSet<Uuid> = self.store.list_learners(None).await?.iter().map(|p| p.id).collect();

        let stats = catalog
            .modules
            .iter()
            .map(|entry| {
                let quiz_ids: HashSet<Uuid> = entry.quizzes.iter().map(|q| q.id).collect();
                let mut started = 0;
                let mut completed = 0;
                let mut stuck = 0;

                for (user_id, attempts) in &history {
                    if !learners.contains(user_id) {
                        continue;
                    }
                    let views = catalog.views(attempts);
                    let in_module: Vec<&QuizAttempt> =
                        attempts.iter().filter(|a| quiz_ids.contains(&a.quiz_id)).collect();
                    if in_module.is_empty() {
                        continue;
                    }
                    started += 1;

                    let answered: HashSet<Uuid> = in_module.iter().map(|a| a.quiz_id).collect();
                    if quiz_ids.iter().all(|q| answered.contains(q)) {
                        completed += 1;
                    }
                    if classification::is_stuck_in(&views, entry.module.id) {
                        stuck += 1;
                    }
                }

                debug!(module_id = %entry.module.id, started, completed, stuck, "Module completion stats");
                ModuleCompletionStat {
                    module_id: entry.module.id,
                    module_title: entry.module.title.clone(),
                    total_completions: completed,
                    total_stuck: stuck,
                    total_started: started,
                    completion_rate: percentage(completed, started),
                }
            })
            .collect();
        Ok(stats)
    }

    /// Learners with five or more failed attempts on the module's quizzes,
    /// most failures first
    pub async fn stuck_users(&self, module_id: Uuid) -> ServiceResult<Vec<StuckUser>> {
        self.store
            .find_module(module_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Module".to_string()))?;

        let quiz_module = self.quiz_modules().await?;
        let history = self.history().await?;

        let mut stuck: Vec<StuckUser> = self
            .store
            .list_learners(None)
            .await?
            .into_iter()
            .filter_map(|learner| {
                let attempts = history.get(&learner.id)?;
                let views: Vec<AttemptView> = attempts
                    .iter()
                    .map(|a| AttemptView::from_attempt(a, quiz_module.get(&a.quiz_id).copied()))
                    .collect();
                if !classification::is_stuck_in(&views, module_id) {
                    return None;
                }
                let failure_count = classification::failures_by_module(&views)
                    .get(&module_id)
                    .copied()
                    .unwrap_or(0);
                Some(StuckUser {
                    user_id: learner.id,
                    user_name: learner.full_name,
                    user_email: learner.email.unwrap_or_default(),
                    failure_count,
                    last_attempt: attempts
                        .iter()
                        .filter(|a| quiz_module.get(&a.quiz_id) == Some(&module_id))
                        .filter_map(|a| a.completed_at)
                        .max(),
                })
            })
            .collect();

        stuck.sort_by(|a, b| b.failure_count.cmp(&a.failure_count));
        Ok(stuck)
    }

    fn summarize(&self, catalog: &Catalog, learner: &Profile, attempts: &[QuizAttempt]) -> LearnerSummary {
        let views = catalog.views(attempts);
        let status = classification::classify(&views);

        let mut completed_modules = 0;
        let mut in_progress_modules = 0;
        let module_quiz_summary: Vec<ModuleQuizSummary> = catalog
            .modules
            .iter()
            .map(|entry| {
                let quiz_ids: HashSet<Uuid> = entry.quizzes.iter().map(|q| q.id).collect();
                let answered: HashSet<Uuid> = attempts
                    .iter()
                    .filter(|a| quiz_ids.contains(&a.quiz_id))
                    .map(|a| a.quiz_id)
                    .collect();
                let passed: HashSet<Uuid> = attempts
                    .iter()
                    .filter(|a| a.passed && quiz_ids.contains(&a.quiz_id))
                    .map(|a| a.quiz_id)
                    .collect();

                match module_status_by_quizzes(answered.len(), quiz_ids.len()) {
                    ModuleStatus::Completed => completed_modules += 1,
                    ModuleStatus::InProgress => in_progress_modules += 1,
                    ModuleStatus::NotStarted => {}
                }

                ModuleQuizSummary {
                    module_id: entry.module.id,
                    module_title: entry.module.title.clone(),
                    quizzes_passed: passed.len(),
                    total_quizzes: quiz_ids.len(),
                }
            })
            .collect();

        let unique: HashSet<Uuid> = attempts.iter().map(|a| a.quiz_id).collect();
        let unique_passed: HashSet<Uuid> = attempts.iter().filter(|a| a.passed).map(|a| a.quiz_id).collect();
        let average = if attempts.is_empty() {
            0.0
        } else {
            views.iter().map(|v| v.score).sum::<f64>() / views.len() as f64
        };
        let total_modules = catalog.modules.len();

        LearnerSummary {
            user_id: learner.id,
            user_name: learner.full_name.clone(),
            user_email: learner.email.clone().unwrap_or_default(),
            user_profil_url: learner.profil_url.clone(),
            total_modules,
            completed_modules,
            in_progress_modules,
            not_started_modules: total_modules - completed_modules - in_progress_modules,
            total_quiz_attempts: attempts.len(),
            total_quiz_passed: unique_passed.len(),
            total_quiz_failed: unique.len() - unique_passed.len(),
            unique_quizzes_attempted: unique.len(),
            pass_rate: percentage(unique_passed.len(), unique.len()),
            average_quiz_score: average.round() as i64,
            module_quiz_summary,
            last_activity: attempts.first().map(|a| a.created_at),
            status,
        }
    }

    pub async fn user_progress_list(&self, query: UserListQuery) -> ServiceResult<UserProgressPage> {
        let limit = query.limit.max(1);
        let page = query.page.max(1);

        let catalog = self.load_catalog().await?;
        let history = self.history().await?;
        let learners = self.store.list_learners(query.search.as_deref()).await?;

        let mut items: Vec<LearnerSummary> = learners
            .iter()
            .map(|learner| {
                let attempts = history.get(&learner.id).map(Vec::as_slice).unwrap_or(&[]);
                self.summarize(&catalog, learner, attempts)
            })
            .filter(|summary| query.status.matches(summary.status))
            .collect();

        // Stable, so equal statuses keep the store's learner order
        items.sort_by_key(|s| s.status.sort_rank());

        let total_count = items.len();
        let offset = (page - 1).saturating_mul(limit);
        let items: Vec<LearnerSummary> = items.into_iter().skip(offset).take(limit).collect();

        Ok(UserProgressPage {
            items,
            pagination: Pagination {
                current_page: page,
                total_pages: total_count.div_ceil(limit),
                total_count,
                limit,
            },
        })
    }

    pub async fn user_detail(&self, user_id: Uuid) -> ServiceResult<UserDetail> {
        let profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let catalog = self.load_catalog().await?;
        let attempts: Vec<QuizAttempt> = self
            .store
            .list_attempts(user_id, None)
            .await?
            .into_iter()
            .filter(|a| a.is_completed())
            .collect();
        let poin_rows = self.store.list_poin_progress(user_id).await?;
        let poin_index: HashMap<Uuid, &PoinProgress> = poin_rows.iter().map(|p| (p.poin_id, p)).collect();

        let mut questions: HashMap<Uuid, Vec<QuizQuestion>> = HashMap::new();
        for quiz_id in attempts.iter().map(|a| a.quiz_id).collect::<HashSet<_>>() {
            questions.insert(quiz_id, self.store.list_questions(quiz_id).await?);
        }

        let modules_progress = catalog
            .modules
            .iter()
            .map(|entry| self.module_detail(entry, &attempts, &questions, &poin_index))
            .collect();

        Ok(UserDetail {
            summary: self.summarize(&catalog, &profile, &attempts),
            modules_progress,
        })
    }

    fn module_detail(
        &self,
        entry: &ModuleEntry,
        attempts: &[QuizAttempt],
        questions: &HashMap<Uuid, Vec<QuizQuestion>>,
        poin_index: &HashMap<Uuid, &PoinProgress>,
    ) -> ModuleDetail {
        let quiz_ids: HashSet<Uuid> = entry.quizzes.iter().map(|q| q.id).collect();
        let in_module: Vec<&QuizAttempt> = attempts.iter().filter(|a| quiz_ids.contains(&a.quiz_id)).collect();
        let answered: HashSet<Uuid> = in_module.iter().map(|a| a.quiz_id).collect();
        let passed: HashSet<Uuid> = in_module.iter().filter(|a| a.passed).map(|a| a.quiz_id).collect();

        let mut quiz_attempts = Vec::new();
        for quiz in &entry.quizzes {
            let sub_entry = quiz
                .sub_material_id
                .and_then(|id| entry.subs.iter().find(|s| s.sub.id == id));
            let (total_poins, counts) = sub_entry
                .map(|s| (s.poins.len(), reading_counts(&s.poins, poin_index)))
                .unwrap_or((0, ReadingCounts::default()));
            let quiz_title = quiz.title.clone().unwrap_or_else(|| UNTITLED_QUIZ.to_string());
            let sub_materi_title = sub_entry
                .map(|s| s.sub.title.clone())
                .unwrap_or_else(|| quiz_title.clone());

            let detail = |attempt: Option<&QuizAttempt>| QuizAttemptDetail {
                quiz_id: quiz.id,
                quiz_title: quiz_title.clone(),
                sub_materi_title: sub_materi_title.clone(),
                score: attempt.and_then(|a| a.score).unwrap_or(0.0),
                passed: attempt.map(|a| a.passed).unwrap_or(false),
                attempted_at: attempt.and_then(|a| a.completed_at),
                total_questions: attempt.map(|a| a.total_questions).unwrap_or(0),
                correct_answers: attempt.and_then(|a| a.correct_answers).unwrap_or(0),
                answers: attempt
                    .map(|a| review_answers(a, questions.get(&a.quiz_id).map(Vec::as_slice).unwrap_or(&[])))
                    .unwrap_or_default(),
                is_attempted: attempt.is_some(),
                reading_completed: total_poins > 0 && counts.scrolled == total_poins,
                reading_percentage: percentage(counts.scrolled, total_poins),
                total_poins,
                scroll_completed_poins: counts.scrolled,
            };

            let taken: Vec<&&QuizAttempt> = in_module.iter().filter(|a| a.quiz_id == quiz.id).collect();
            if taken.is_empty() {
                quiz_attempts.push(detail(None));
            } else {
                quiz_attempts.extend(taken.into_iter().map(|a| detail(Some(*a))));
            }
        }

        ModuleDetail {
            module_id: entry.module.id,
            module_title: entry.module.title.clone(),
            status: module_status_by_quizzes(answered.len(), quiz_ids.len()),
            total_materials: entry.subs.len(),
            quizzes_passed: passed.len(),
            total_quizzes: quiz_ids.len(),
            quiz_attempts,
            last_accessed: in_module.first().and_then(|a| a.completed_at),
            overall_progress: percentage(answered.len(), quiz_ids.len()),
        }
    }

    /// Scroll-reading statistics per learner and module. Modules without poins
    /// are skipped, as are pairs where the learner scrolled nothing.
    pub async fn reading_progress(&self) -> ServiceResult<Vec<ReadingProgressEntry>> {
        let catalog = self.load_catalog().await?;
        let all_rows = self.store.list_all_poin_progress().await?;
        let mut rows_by_user: HashMap<Uuid, HashMap<Uuid, &PoinProgress>> = HashMap::new();
        for row in &all_rows {
            rows_by_user.entry(row.user_id).or_default().insert(row.poin_id, row);
        }

        let mut entries = Vec::new();
        for learner in self.store.list_learners(None).await? {
            let Some(rows) = rows_by_user.get(&learner.id) else {
                continue;
            };

            for entry in &catalog.modules {
                let total_poins: usize = entry.subs.iter().map(|s| s.poins.len()).sum();
                if total_poins == 0 {
                    continue;
                }

                let sub_materis: Vec<SubMaterialReading> = entry
                    .subs
                    .iter()
                    .map(|s| {
                        let counts = reading_counts(&s.poins, rows);
                        SubMaterialReading {
                            sub_materi_id: s.sub.id,
                            sub_materi_title: s.sub.title.clone(),
                            total_poins: s.poins.len(),
                            read_poins: counts.read,
                            scroll_completed_poins: counts.scrolled,
                            read_percentage: percentage(counts.scrolled, s.poins.len()),
                        }
                    })
                    .collect();

                let read_poins = sub_materis.iter().map(|s| s.read_poins).sum();
                let scrolled: usize = sub_materis.iter().map(|s| s.scroll_completed_poins).sum();
                if scrolled == 0 {
                    continue;
                }

                entries.push(ReadingProgressEntry {
                    user_id: learner.id,
                    user_name: learner.full_name.clone(),
                    user_email: learner.email.clone().unwrap_or_default(),
                    module_id: entry.module.id,
                    module_title: entry.module.title.clone(),
                    sub_materis,
                    total_poins,
                    read_poins,
                    scroll_completed_poins: scrolled,
                    read_percentage: percentage(scrolled, total_poins),
                });
            }
        }
        Ok(entries)
    }
}

/// Stored answers matched to their questions by id, in answer order
fn review_answers(attempt: &QuizAttempt, questions: &[QuizQuestion]) -> Vec<AnswerReview> {
    attempt
        .answers
        .iter()
        .map(|answer| match questions.iter().find(|q| q.id == answer.question_id) {
            Some(question) => AnswerReview {
                question_id: Some(question.id),
                question_text: question.question_text.clone(),
                user_answer: option_text(&question.options, answer.selected_option_index)
                    .unwrap_or_else(|| NOT_ANSWERED.to_string()),
                correct_answer: option_text(&question.options, question.correct_answer_index)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                is_correct: answer.selected_option_index == question.correct_answer_index,
            },
            None => AnswerReview {
                question_id: None,
                question_text: MISSING_QUESTION.to_string(),
                user_answer: NOT_AVAILABLE.to_string(),
                correct_answer: NOT_AVAILABLE.to_string(),
                is_correct: false,
            },
        })
        .collect()
}
