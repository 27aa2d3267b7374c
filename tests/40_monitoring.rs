mod common;

use anyhow::Result;
use cadre_api::database::seed::{completed_attempt, learner};
use reqwest::StatusCode;
use serde_json::json;

async fn fail_times(server: &common::TestServer, user: uuid::Uuid, quiz: uuid::Uuid, times: usize) {
    for _ in 0..times {
        server.store.insert_attempt(completed_attempt(user, quiz, 25.0, false)).await;
    }
}

#[tokio::test]
async fn stats_and_user_list_classify_learners() -> Result<()> {
    let server = common::spawn_server().await?;
    let admin = server.admin_token();
    let demo = &server.demo;

    let achiever = learner("Ani Lestari", "ani@cadre.test");
    let achiever_id = achiever.id;
    server.store.insert_profile(achiever).await;
    server
        .store
        .insert_attempt(completed_attempt(achiever_id, demo.quiz_module, 100.0, true))
        .await;
    fail_times(&server, demo.learner_id, demo.quiz_a, 5).await;

    let (status, stats) = server.get("/admin/progress-monitoring/stats", &admin).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stats["data"],
        json!({
            "total_users": 3,
            "active_users": 1,
            "struggling_users": 1,
            "inactive_users": 1,
            "high_scoring_users": 1
        })
    );

    let (_, list) = server.get("/admin/progress-monitoring/users", &admin).await?;
    let items = list["data"]["items"].as_array().expect("items");
    let statuses: Vec<&str> = items.iter().filter_map(|i| i["status"].as_str()).collect();
    assert_eq!(statuses, vec!["struggling", "active", "inactive"]);
    assert_eq!(list["data"]["pagination"]["total_count"], 3);
    assert_eq!(list["data"]["pagination"]["limit"], 10);

    let (_, filtered) = server
        .get("/admin/progress-monitoring/users?status=struggling&search=siti", &admin)
        .await?;
    assert_eq!(filtered["data"]["items"][0]["user_id"], json!(demo.learner_id));
    assert_eq!(filtered["data"]["pagination"]["total_count"], 1);

    let (_, paged) = server
        .get("/admin/progress-monitoring/users?page=2&limit=2", &admin)
        .await?;
    assert_eq!(paged["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(paged["data"]["pagination"]["total_pages"], 2);

    let (status, _) = server
        .get("/admin/progress-monitoring/users?status=learning", &admin)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn module_stats_and_stuck_users() -> Result<()> {
    let server = common::spawn_server().await?;
    let admin = server.admin_token();
    let demo = &server.demo;

    fail_times(&server, demo.other_learner_id, demo.quiz_module, 7).await;
    fail_times(&server, demo.learner_id, demo.quiz_a, 4).await;

    let (_, stats) = server.get("/admin/progress-monitoring/module-stats", &admin).await?;
    let module = &stats["data"][0];
    assert_eq!(module["module_id"], json!(demo.module_id));
    assert_eq!(module["total_started"], 2);
    assert_eq!(module["total_stuck"], 1);
    assert_eq!(module["total_completions"], 0);
    assert_eq!(module["completion_rate"], 0);

    let (status, stuck) = server
        .get(&format!("/admin/progress-monitoring/stuck-users/{}", demo.module_id), &admin)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let stuck = stuck["data"].as_array().expect("stuck users");
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0]["user_id"], json!(demo.other_learner_id));
    assert_eq!(stuck[0]["failure_count"], 7);
    assert_eq!(stuck[0]["user_email"], "budi@cadre.test");

    let (status, _) = server
        .get(&format!("/admin/progress-monitoring/stuck-users/{}", uuid::Uuid::new_v4()), &admin)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn user_detail_reviews_answers() -> Result<()> {
    let server = common::spawn_server().await?;
    let demo = &server.demo;

    server
        .post(
            "/quizzes/submit",
            &server.learner_token(),
            json!({ "quiz_id": demo.quiz_a, "answers": common::TestServer::answers(&demo.quiz_a_key, 1) }),
        )
        .await?;

    let (status, detail) = server
        .get(&format!("/admin/progress-monitoring/users/{}", demo.learner_id), &server.admin_token())
        .await?;
    assert_eq!(status, StatusCode::OK);
    let data = &detail["data"];
    assert_eq!(data["user_name"], "Siti Aminah");
    assert_eq!(data["status"], "active");
    assert_eq!(data["total_quiz_attempts"], 1);
    assert_eq!(data["total_quiz_failed"], 1);

    let module = &data["modules_progress"][0];
    assert_eq!(module["status"], "in-progress");
    let attempts = module["quiz_attempts"].as_array().expect("quiz attempts");
    let taken = attempts
        .iter()
        .find(|a| a["quiz_id"] == json!(demo.quiz_a))
        .expect("attempt on quiz A");
    assert_eq!(taken["score"], 50.0);
    assert_eq!(taken["answers"][0]["is_correct"], true);
    assert_eq!(taken["answers"][1]["is_correct"], false);
    assert_eq!(taken["answers"][0]["question_text"], "Pertanyaan 1");

    let (status, _) = server
        .get(&format!("/admin/progress-monitoring/users/{}", uuid::Uuid::new_v4()), &server.admin_token())
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn reading_progress_reports_scrolled_modules() -> Result<()> {
    let server = common::spawn_server().await?;
    let demo = &server.demo;

    server
        .post(&format!("/progress/poins/{}/scroll-complete", demo.poin_a), &server.learner_token(), json!({}))
        .await?;

    let (status, body) = server
        .get("/admin/progress-monitoring/reading-progress", &server.admin_token())
        .await?;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], json!(demo.learner_id));
    assert_eq!(entries[0]["read_percentage"], 50);
    assert_eq!(entries[0]["sub_materis"][0]["read_percentage"], 100);
    assert_eq!(entries[0]["sub_materis"][1]["scroll_completed_poins"], 0);
    Ok(())
}
