//! Demo catalog used by `serve --memory` and by the test suites.

use chrono::{Duration, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::memory::MemoryStore;
use super::models::{Module, PoinDetail, Profile, Quiz, QuizAttempt, QuizQuestion, SubMaterial};
use crate::types::Role;

/// Ids of everything `demo_catalog` created
#[derive(Debug, Clone)]
pub struct DemoCatalog {
    pub admin_id: Uuid,
    pub learner_id: Uuid,
    /// Second learner with no activity, handy for monitoring views
    pub other_learner_id: Uuid,
    pub module_id: Uuid,
    pub sub_a: Uuid,
    pub sub_b: Uuid,
    pub poin_a: Uuid,
    pub poin_b: Uuid,
    /// Quiz tied to sub-material A, two questions, passing score 70
    pub quiz_a: Uuid,
    /// Module-level quiz, four questions, passing score 70
    pub quiz_module: Uuid,
    /// Published quiz without questions
    pub quiz_empty: Uuid,
    /// Unpublished quiz
    pub quiz_draft: Uuid,
    /// (question id, correct option index) in question order
    pub quiz_a_key: Vec<(Uuid, i32)>,
    pub quiz_module_key: Vec<(Uuid, i32)>,
}

fn profile(name: &str, email: &str, role: Role, age_minutes: i64) -> Profile {
    let at = Utc::now() - Duration::minutes(age_minutes);
    Profile {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: Some(email.to_string()),
        phone: None,
        profil_url: None,
        role,
        created_at: at,
        updated_at: at,
    }
}

fn quiz(module_id: Uuid, sub_material_id: Option<Uuid>, title: &str, published: bool) -> Quiz {
    Quiz {
        id: Uuid::new_v4(),
        module_id,
        sub_material_id,
        title: Some(title.to_string()),
        time_limit_seconds: 600,
        passing_score: 70,
        published,
        created_at: Utc::now(),
    }
}

async fn add_questions(store: &MemoryStore, quiz_id: Uuid, correct: &[i32]) -> Vec<(Uuid, i32)> {
    let mut key = Vec::with_capacity(correct.len());
    for (i, answer) in correct.iter().enumerate() {
        let question = QuizQuestion {
            id: Uuid::new_v4(),
            quiz_id,
            question_text: format!("Pertanyaan {}", i + 1),
            options: Json(vec!["A".into(), "B".into(), "C".into(), "D".into()]),
            correct_answer_index: *answer,
            explanation: Some(format!("Jawaban yang benar adalah opsi {}", answer + 1)),
            order_index: i as i32,
        };
        key.push((question.id, *answer));
        store.insert_question(question).await;
    }
    key
}

/// Seed one module with two sequential sub-materials (one poin each), a quiz
/// on the first sub-material, a module-level quiz, an admin and two learners.
pub async fn demo_catalog(store: &MemoryStore) -> DemoCatalog {
    let now = Utc::now();

    let admin = profile("Admin Puskesmas", "admin@cadre.test", Role::Admin, 30);
    let learner = profile("Siti Aminah", "siti@cadre.test", Role::Learner, 20);
    let other = profile("Budi Santoso", "budi@cadre.test", Role::Learner, 10);

    let module = Module {
        id: Uuid::new_v4(),
        title: "Dasar-Dasar Posyandu".to_string(),
        slug: "dasar-dasar-posyandu".to_string(),
        description: Some("Pengenalan kegiatan posyandu untuk kader".to_string()),
        published: true,
        created_at: now,
        updated_at: now,
    };

    let sub = |title: &str, order_index: i32| SubMaterial {
        id: Uuid::new_v4(),
        module_id: module.id,
        title: title.to_string(),
        order_index,
        published: true,
        created_at: now,
    };
    let sub_a = sub("Pengertian Posyandu", 0);
    let sub_b = sub("Lima Meja Posyandu", 1);

    let poin = |sub_material_id: Uuid, title: &str| PoinDetail {
        id: Uuid::new_v4(),
        sub_material_id,
        title: title.to_string(),
        content_html: Some(format!("<p>{}</p>", title)),
        duration_minutes: Some(5),
        order_index: 0,
        created_at: now,
    };
    let poin_a = poin(sub_a.id, "Apa itu posyandu");
    let poin_b = poin(sub_b.id, "Meja pendaftaran");

    let quiz_a = quiz(module.id, Some(sub_a.id), "Kuis Pengertian Posyandu", true);
    let quiz_module = quiz(module.id, None, "Evaluasi Modul Posyandu", true);
    let quiz_empty = quiz(module.id, None, "Kuis Kosong", true);
    let quiz_draft = quiz(module.id, None, "Kuis Draf", false);

    let catalog = DemoCatalog {
        admin_id: admin.id,
        learner_id: learner.id,
        other_learner_id: other.id,
        module_id: module.id,
        sub_a: sub_a.id,
        sub_b: sub_b.id,
        poin_a: poin_a.id,
        poin_b: poin_b.id,
        quiz_a: quiz_a.id,
        quiz_module: quiz_module.id,
        quiz_empty: quiz_empty.id,
        quiz_draft: quiz_draft.id,
        quiz_a_key: add_questions(store, quiz_a.id, &[1, 0]).await,
        quiz_module_key: add_questions(store, quiz_module.id, &[0, 1, 2, 3]).await,
    };
    add_questions(store, quiz_draft.id, &[2]).await;

    for p in [admin, learner, other] {
        store.insert_profile(p).await;
    }
    store.insert_module(module).await;
    store.insert_sub_material(sub_a).await;
    store.insert_sub_material(sub_b).await;
    store.insert_poin(poin_a).await;
    store.insert_poin(poin_b).await;
    for q in [quiz_a, quiz_module, quiz_empty, quiz_draft] {
        store.insert_quiz(q).await;
    }

    catalog
}

/// A graded attempt row with the given score, for seeding histories
pub fn completed_attempt(user_id: Uuid, quiz_id: Uuid, score: f64, passed: bool) -> QuizAttempt {
    let mut attempt = QuizAttempt::open(user_id, quiz_id, 4);
    attempt.score = Some(score);
    attempt.correct_answers = Some((score / 25.0).round() as i32);
    attempt.passed = passed;
    attempt.completed_at = Some(attempt.started_at);
    attempt
}

/// Learner profile helper for tests that need more than the two demo learners
pub fn learner(name: &str, email: &str) -> Profile {
    profile(name, email, Role::Learner, 0)
}
