use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{
    Module, ModuleProgress, PoinDetail, PoinProgress, Profile, Quiz, QuizAttempt, QuizQuestion,
    SubMaterial, SubMaterialProgress,
};
use super::store::{ContentStore, ProgressStore, ScrollOutcome, StartedAttempt, StoreResult};
use crate::types::{ModuleStatus, Role};

type Key = (Uuid, Uuid);

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    modules: HashMap<Uuid, Module>,
    sub_materials: HashMap<Uuid, SubMaterial>,
    poins: HashMap<Uuid, PoinDetail>,
    quizzes: HashMap<Uuid, Quiz>,
    questions: HashMap<Uuid, QuizQuestion>,
    module_progress: HashMap<Key, ModuleProgress>,
    sub_material_progress: HashMap<Key, SubMaterialProgress>,
    poin_progress: HashMap<Key, PoinProgress>,
    attempts: Vec<QuizAttempt>,
}

impl Tables {
    fn sub_material_row(&mut self, user_id: Uuid, sub_material_id: Uuid, unlocked: bool) -> &mut SubMaterialProgress {
        self.sub_material_progress
            .entry((user_id, sub_material_id))
            .or_insert_with(|| SubMaterialProgress::new(user_id, sub_material_id, unlocked))
    }

    fn poin_row(&mut self, user_id: Uuid, poin_id: Uuid) -> &mut PoinProgress {
        self.poin_progress
            .entry((user_id, poin_id))
            .or_insert_with(|| PoinProgress::new(user_id, poin_id))
    }
}

/// In-process store. Every mutation holds the single write lock for its whole
/// duration, so compound writes are atomic with respect to other requests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.tables.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn insert_module(&self, module: Module) {
        self.tables.write().await.modules.insert(module.id, module);
    }

    pub async fn insert_sub_material(&self, sub: SubMaterial) {
        self.tables.write().await.sub_materials.insert(sub.id, sub);
    }

    pub async fn insert_poin(&self, poin: PoinDetail) {
        self.tables.write().await.poins.insert(poin.id, poin);
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        self.tables.write().await.quizzes.insert(quiz.id, quiz);
    }

    pub async fn insert_question(&self, question: QuizQuestion) {
        self.tables.write().await.questions.insert(question.id, question);
    }

    /// Seed an attempt row directly, bypassing grading
    pub async fn insert_attempt(&self, attempt: QuizAttempt) {
        self.tables.write().await.attempts.push(attempt);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_module(&self, id: Uuid) -> StoreResult<Option<Module>> {
        Ok(self.tables.read().await.modules.get(&id).cloned())
    }

    async fn list_published_modules(&self) -> StoreResult<Vec<Module>> {
        let tables = self.tables.read().await;
        let mut modules: Vec<Module> = tables.modules.values().filter(|m| m.published).cloned().collect();
        modules.sort_by_key(|m| (m.created_at, m.id));
        Ok(modules)
    }

    async fn list_sub_materials(&self, module_id: Uuid) -> StoreResult<Vec<SubMaterial>> {
        let tables = self.tables.read().await;
        let mut subs: Vec<SubMaterial> = tables
            .sub_materials
            .values()
            .filter(|s| s.module_id == module_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.order_index);
        Ok(subs)
    }

    async fn find_sub_material(&self, id: Uuid) -> StoreResult<Option<SubMaterial>> {
        Ok(self.tables.read().await.sub_materials.get(&id).cloned())
    }

    async fn find_sub_material_at(&self, module_id: Uuid, order_index: i32) -> StoreResult<Option<SubMaterial>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sub_materials
            .values()
            .find(|s| s.module_id == module_id && s.order_index == order_index)
            .cloned())
    }

    async fn count_published_sub_materials(&self) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.sub_materials.values().filter(|s| s.published).count() as i64)
    }

    async fn list_poins(&self, sub_material_id: Uuid) -> StoreResult<Vec<PoinDetail>> {
        let tables = self.tables.read().await;
        let mut poins: Vec<PoinDetail> = tables
            .poins
            .values()
            .filter(|p| p.sub_material_id == sub_material_id)
            .cloned()
            .collect();
        poins.sort_by_key(|p| p.order_index);
        Ok(poins)
    }

    async fn find_poin(&self, id: Uuid) -> StoreResult<Option<PoinDetail>> {
        Ok(self.tables.read().await.poins.get(&id).cloned())
    }

    async fn find_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn list_quizzes_by_module(&self, module_id: Uuid) -> StoreResult<Vec<Quiz>> {
        let tables = self.tables.read().await;
        let mut quizzes: Vec<Quiz> = tables.quizzes.values().filter(|q| q.module_id == module_id).cloned().collect();
        quizzes.sort_by_key(|q| (q.created_at, q.id));
        Ok(quizzes)
    }

    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        let tables = self.tables.read().await;
        let mut quizzes: Vec<Quiz> = tables.quizzes.values().cloned().collect();
        quizzes.sort_by_key(|q| (q.created_at, q.id));
        Ok(quizzes)
    }

    async fn list_questions(&self, quiz_id: Uuid) -> StoreResult<Vec<QuizQuestion>> {
        let tables = self.tables.read().await;
        let mut questions: Vec<QuizQuestion> = tables
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order_index);
        Ok(questions)
    }

    async fn find_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn list_learners(&self, search: Option<&str>) -> StoreResult<Vec<Profile>> {
        let tables = self.tables.read().await;
        let mut learners: Vec<Profile> = tables
            .profiles
            .values()
            .filter(|p| p.role == Role::Learner)
            .filter(|p| search.map(|s| p.matches_search(s)).unwrap_or(true))
            .cloned()
            .collect();
        learners.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(learners)
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn find_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<Option<ModuleProgress>> {
        Ok(self.tables.read().await.module_progress.get(&(user_id, module_id)).cloned())
    }

    async fn list_module_progress(&self, user_id: Uuid) -> StoreResult<Vec<ModuleProgress>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ModuleProgress> = tables
            .module_progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(rows)
    }

    async fn ensure_module_progress(&self, user_id: Uuid, module_id: Uuid) -> StoreResult<ModuleProgress> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .module_progress
            .entry((user_id, module_id))
            .or_insert_with(|| ModuleProgress::new(user_id, module_id))
            .clone())
    }

    async fn save_module_progress(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        percent: i32,
        status: ModuleStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<ModuleProgress> {
        let mut tables = self.tables.write().await;
        let row = tables
            .module_progress
            .entry((user_id, module_id))
            .or_insert_with(|| ModuleProgress::new(user_id, module_id));
        let now = Utc::now();
        row.progress_percent = percent;
        row.status = status;
        row.completed_at = completed_at;
        row.last_accessed_at = now;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn find_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<Option<SubMaterialProgress>> {
        Ok(self
            .tables
            .read()
            .await
            .sub_material_progress
            .get(&(user_id, sub_material_id))
            .cloned())
    }

    async fn list_sub_material_progress(&self, user_id: Uuid) -> StoreResult<Vec<SubMaterialProgress>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sub_material_progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn ensure_sub_material_progress(&self, user_id: Uuid, sub_material_id: Uuid, unlocked: bool) -> StoreResult<SubMaterialProgress> {
        let mut tables = self.tables.write().await;
        Ok(tables.sub_material_row(user_id, sub_material_id, unlocked).clone())
    }

    async fn unlock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress> {
        let mut tables = self.tables.write().await;
        let row = tables.sub_material_row(user_id, sub_material_id, true);
        row.is_unlocked = true;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn lock_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.sub_material_progress.get_mut(&(user_id, sub_material_id)) {
            Some(row) if row.is_unlocked && !row.is_completed => {
                row.is_unlocked = false;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_sub_material_reading(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        percent: i32,
        current_poin_index: i32,
    ) -> StoreResult<SubMaterialProgress> {
        let mut tables = self.tables.write().await;
        let row = tables.sub_material_row(user_id, sub_material_id, true);
        let now = Utc::now();
        row.progress_percent = percent;
        row.current_poin_index = current_poin_index;
        row.last_accessed_at = now;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn complete_sub_material(&self, user_id: Uuid, sub_material_id: Uuid) -> StoreResult<SubMaterialProgress> {
        let mut tables = self.tables.write().await;
        let row = tables.sub_material_row(user_id, sub_material_id, true);
        let now = Utc::now();
        row.is_unlocked = true;
        row.is_completed = true;
        row.progress_percent = 100;
        row.completed_at = row.completed_at.or(Some(now));
        row.last_accessed_at = now;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn complete_sub_material_content(
        &self,
        user_id: Uuid,
        sub_material_id: Uuid,
        poin_ids: &[Uuid],
    ) -> StoreResult<SubMaterialProgress> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        for poin_id in poin_ids {
            let poin = tables.poin_row(user_id, *poin_id);
            poin.is_completed = true;
            poin.completed_at = poin.completed_at.or(Some(now));
        }
        let row = tables.sub_material_row(user_id, sub_material_id, true);
        row.is_unlocked = true;
        row.is_completed = true;
        row.progress_percent = 100;
        row.current_poin_index = poin_ids.len() as i32;
        row.completed_at = row.completed_at.or(Some(now));
        row.last_accessed_at = now;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn find_poin_progress(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<Option<PoinProgress>> {
        Ok(self.tables.read().await.poin_progress.get(&(user_id, poin_id)).cloned())
    }

    async fn list_poin_progress(&self, user_id: Uuid) -> StoreResult<Vec<PoinProgress>> {
        let tables = self.tables.read().await;
        Ok(tables.poin_progress.values().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn list_all_poin_progress(&self) -> StoreResult<Vec<PoinProgress>> {
        Ok(self.tables.read().await.poin_progress.values().cloned().collect())
    }

    async fn complete_poin(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<PoinProgress> {
        let mut tables = self.tables.write().await;
        let row = tables.poin_row(user_id, poin_id);
        row.is_completed = true;
        row.completed_at = row.completed_at.or(Some(Utc::now()));
        Ok(row.clone())
    }

    async fn mark_poin_scrolled(&self, user_id: Uuid, poin_id: Uuid) -> StoreResult<ScrollOutcome> {
        let mut tables = self.tables.write().await;
        let row = tables.poin_row(user_id, poin_id);
        if row.scroll_completed {
            return Ok(ScrollOutcome { progress: row.clone(), already_completed: true });
        }
        row.scroll_completed = true;
        row.scroll_completed_at = Some(Utc::now());
        Ok(ScrollOutcome { progress: row.clone(), already_completed: false })
    }

    async fn start_attempt(&self, user_id: Uuid, quiz_id: Uuid, total_questions: i32) -> StoreResult<StartedAttempt> {
        let mut tables = self.tables.write().await;
        if let Some(open) = tables
            .attempts
            .iter()
            .find(|a| a.user_id == user_id && a.quiz_id == quiz_id && !a.is_completed())
        {
            return Ok(StartedAttempt { attempt: open.clone(), existing: true });
        }
        let attempt = QuizAttempt::open(user_id, quiz_id, total_questions);
        tables.attempts.push(attempt.clone());
        Ok(StartedAttempt { attempt, existing: false })
    }

    async fn insert_completed_attempt(&self, attempt: QuizAttempt) -> StoreResult<QuizAttempt> {
        self.tables.write().await.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn list_attempts(&self, user_id: Uuid, quiz_id: Option<Uuid>) -> StoreResult<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        // Insertion order breaks ties between equal timestamps
        let mut rows: Vec<(usize, QuizAttempt)> = tables
            .attempts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.user_id == user_id && quiz_id.map(|q| a.quiz_id == q).unwrap_or(true))
            .map(|(i, a)| (i, a.clone()))
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(rows.into_iter().map(|(_, a)| a).collect())
    }

    async fn list_completed_attempts(&self) -> StoreResult<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QuizAttempt> = tables.attempts.iter().filter(|a| a.is_completed()).cloned().collect();
        // Stable sort keeps insertion order for equal timestamps
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
