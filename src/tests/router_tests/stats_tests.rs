// src/tests/router_tests/stats_tests.rs

use super::{get, post};
use crate::router::handle;
use crate::tests::utils::{body_json, test_state, wait_for_job, FixtureFetcher};

#[test]
fn stats_match_the_stored_rows() {
    let state = test_state(FixtureFetcher::rightmove());

    let resp = handle(post("/api/scrape/", r#"{"max_pages": 1}"#), &state).unwrap();
    let task_id = body_json(resp)["task_id"].as_i64().unwrap();
    wait_for_job(&state.db, task_id);

    let stats = body_json(handle(get("/api/stats/"), &state).unwrap());
    let listed = body_json(handle(get("/api/properties/?page_size=100"), &state).unwrap());

    assert_eq!(stats["total_properties"], listed["count"]);
    assert_eq!(stats["total_properties"], 3);
    assert_eq!(stats["with_price"], 2);
    assert_eq!(stats["min_price"], 285_000.0);
    assert_eq!(stats["max_price"], 550_000.0);
    assert_eq!(stats["total_images"], 3);
    assert_eq!(stats["by_status"]["completed"], 2);
    assert_eq!(stats["by_status"]["failed"], 1);
    assert_eq!(stats["by_property_type"]["Flat"], 1);
    assert_eq!(stats["jobs"]["completed"], 1);
}

#[test]
fn stats_on_empty_database() {
    let state = test_state(FixtureFetcher::default());

    let stats = body_json(handle(get("/api/stats/"), &state).unwrap());
    assert_eq!(stats["total_properties"], 0);
    assert!(stats["average_price"].is_null());
    assert!(stats["last_scraped_at"].is_null());
    assert_eq!(stats["jobs"]["pending"], 0);
}
