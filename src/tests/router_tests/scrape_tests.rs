// src/tests/router_tests/scrape_tests.rs

use super::{expect_err, get, post};
use crate::domain::JobStatus;
use crate::errors::ServerError;
use crate::router::handle;
use crate::tests::utils::{body_json, test_state, wait_for_job, FixtureFetcher, SEARCH_URL};

#[test]
fn scrape_request_queues_job_and_worker_stores_listings() {
    let state = test_state(FixtureFetcher::rightmove());

    let body = format!(r#"{{"search_url": "{SEARCH_URL}", "max_pages": 2}}"#);
    let resp = handle(post("/api/scrape/", &body), &state).unwrap();
    assert_eq!(resp.status(), 200);

    let json = body_json(resp);
    assert_eq!(json["status"], "success");
    assert!(json["message"].as_str().unwrap().contains("Scraping started"));
    let task_id = json["task_id"].as_i64().expect("task_id should be an integer");

    let job = wait_for_job(&state.db, task_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_fetched, 1, "page two is missing so pagination stops");
    assert_eq!(job.urls_found, 3);
    assert_eq!(job.properties_created, 2);
    assert_eq!(job.properties_failed, 1);

    let resp = handle(get(&format!("/api/jobs/{task_id}/")), &state).unwrap();
    let json = body_json(resp);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["search_url"], SEARCH_URL);
}

#[test]
fn empty_body_uses_default_search() {
    let state = test_state(FixtureFetcher::rightmove());

    let resp = handle(post("/api/scrape/", ""), &state).unwrap();
    assert_eq!(resp.status(), 200);
    let task_id = body_json(resp)["task_id"].as_i64().unwrap();

    let job = wait_for_job(&state.db, task_id);
    assert_eq!(job.search_url, SEARCH_URL);
    assert_eq!(job.max_pages, 3);
}

#[test]
fn whole_number_floats_are_accepted_for_max_pages() {
    let state = test_state(FixtureFetcher::rightmove());

    let resp = handle(post("/api/scrape/", r#"{"max_pages": 2.0}"#), &state).unwrap();
    assert_eq!(resp.status(), 200);
    let task_id = body_json(resp)["task_id"].as_i64().unwrap();

    let job = wait_for_job(&state.db, task_id);
    assert_eq!(job.max_pages, 2);
    assert_eq!(job.status, JobStatus::Completed);
}

#[test]
fn unreachable_search_page_fails_the_job() {
    let state = test_state(FixtureFetcher::default());

    let resp = handle(post("/api/scrape/", "{}"), &state).unwrap();
    let task_id = body_json(resp)["task_id"].as_i64().unwrap();

    let job = wait_for_job(&state.db, task_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap_or_default().contains("404"));
    assert_eq!(job.properties_created, 0);
}

#[test]
fn invalid_scrape_requests_are_rejected() {
    let state = test_state(FixtureFetcher::default());

    let cases = [
        "{not json",
        r#"{"search_url": "not a url"}"#,
        r#"{"search_url": "ftp://example.com/list"}"#,
        r#"{"max_pages": 0}"#,
        r#"{"max_pages": 51}"#,
        r#"{"max_pages": "five"}"#,
        r#"{"max_pages": 2.5}"#,
        r#"{"max_pages": -1}"#,
    ];

    for body in cases {
        let err = expect_err(handle(post("/api/scrape/", body), &state));
        assert!(
            matches!(err, ServerError::BadRequest(_)),
            "body {body:?} should be rejected, got {err:?}"
        );
        assert_eq!(err.status(), 400);
    }

    let jobs = state
        .db
        .with_conn(|conn| crate::db::jobs::job_counts(conn))
        .unwrap();
    assert_eq!(jobs.pending + jobs.running + jobs.completed + jobs.failed, 0);
}

#[test]
fn scrape_endpoint_only_accepts_post() {
    let state = test_state(FixtureFetcher::default());

    let err = expect_err(handle(get("/api/scrape/"), &state));
    assert!(matches!(err, ServerError::MethodNotAllowed));
    assert_eq!(err.status(), 405);
}
