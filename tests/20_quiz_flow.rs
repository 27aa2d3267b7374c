mod common;

use anyhow::Result;
use common::TestServer;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn reading_then_passing_quiz_unlocks_next_sub_material() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.learner_token();
    let demo = &server.demo;

    // Read the only poin of sub-material A
    let (status, body) = server
        .post(&format!("/progress/poins/{}/complete", demo.poin_a), &token, json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sub_material"]["progress_percent"], 100);

    // B stays locked until the quiz on A is passed
    let (_, body) = server
        .get(&format!("/progress/materials/{}/access", demo.sub_b), &token)
        .await?;
    assert_eq!(body["data"]["can_access"], false);

    let (status, body) = server
        .post(
            "/quizzes/submit",
            &token,
            json!({ "quiz_id": demo.quiz_a, "answers": TestServer::answers(&demo.quiz_a_key, 2) }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 100.0);
    assert_eq!(body["data"]["passed"], true);
    assert_eq!(body["data"]["correct_answers"], 2);

    let (status, body) = server
        .get(&format!("/progress/modules/{}", demo.module_id), &token)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["progress"]["status"], "in-progress");
    assert_eq!(data["progress"]["progress_percent"], 50);
    assert_eq!(data["sub_materis"][0]["is_completed"], true);
    assert_eq!(data["sub_materis"][1]["is_unlocked"], true);
    assert_eq!(data["sub_materis"][1]["is_completed"], false);

    let (_, body) = server
        .get(&format!("/progress/materials/{}/access", demo.sub_b), &token)
        .await?;
    assert_eq!(body["data"]["can_access"], true);
    Ok(())
}

#[tokio::test]
async fn module_quiz_scores_three_of_four_as_pass() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.learner_token();
    let key = &server.demo.quiz_module_key;

    let (_, pass) = server
        .post(
            "/quizzes/submit",
            &token,
            json!({ "quizId": server.demo.quiz_module, "answers": TestServer::answers(key, 3) }),
        )
        .await?;
    assert_eq!(pass["data"]["score"], 75.0);
    assert_eq!(pass["data"]["passed"], true);

    let (_, fail) = server
        .post(
            "/quizzes/submit",
            &token,
            json!({ "quiz_id": server.demo.quiz_module, "answers": TestServer::answers(key, 2) }),
        )
        .await?;
    assert_eq!(fail["data"]["score"], 50.0);
    assert_eq!(fail["data"]["passed"], false);

    let (_, history) = server
        .get(&format!("/quizzes/attempts/me?quiz_id={}", server.demo.quiz_module), &token)
        .await?;
    let attempts = history["data"].as_array().expect("attempt list");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["score"], 50.0, "newest first");
    Ok(())
}

#[tokio::test]
async fn empty_quiz_scores_zero() -> Result<()> {
    let server = common::spawn_server().await?;
    let (status, body) = server
        .post(
            "/quizzes/submit",
            &server.learner_token(),
            json!({ "quiz_id": server.demo.quiz_empty, "answers": [] }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 0.0);
    assert_eq!(body["data"]["passed"], false);
    Ok(())
}

#[tokio::test]
async fn start_resumes_the_open_attempt() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.learner_token();

    let (status, first) = server
        .post("/quizzes/start", &token, json!({ "quiz_id": server.demo.quiz_a }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["is_existing"], false);
    assert_eq!(first["data"]["total_questions"], 2);
    assert_eq!(first["data"]["time_limit_seconds"], 600);

    let (_, second) = server
        .post("/quizzes/start", &token, json!({ "quizId": server.demo.quiz_a }))
        .await?;
    assert_eq!(second["data"]["is_existing"], true);
    assert_eq!(second["data"]["attempt_id"], first["data"]["attempt_id"]);
    Ok(())
}

#[tokio::test]
async fn start_and_submit_reject_bad_requests() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.learner_token();
    let demo = &server.demo;

    let (status, body) = server.post("/quizzes/start", &token, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = server
        .post("/quizzes/start", &token, json!({ "quiz_id": uuid::Uuid::new_v4() }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .post("/quizzes/start", &token, json!({ "quiz_id": demo.quiz_draft }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (question, _) = demo.quiz_a_key[0];
    let duplicate = json!([
        { "question_id": question, "selected_option_index": 0 },
        { "question_id": question, "selected_option_index": 1 },
    ]);
    let (status, _) = server
        .post("/quizzes/submit", &token, json!({ "quiz_id": demo.quiz_a, "answers": duplicate }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .post("/quizzes/submit", &token, json!({ "answers": [] }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_JSON");
    Ok(())
}

#[tokio::test]
async fn quiz_detail_hides_answer_key() -> Result<()> {
    let server = common::spawn_server().await?;
    let token = server.learner_token();

    let (status, body) = server.get(&format!("/quizzes/{}", server.demo.quiz_a), &token).await?;
    assert_eq!(status, StatusCode::OK);
    let questions = body["data"]["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.get("correct_answer_index").is_none()));

    let (status, body) = server
        .get(&format!("/quizzes/module/{}", server.demo.module_id), &token)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3), "drafts are not listed");
    Ok(())
}
