// src/tests/router_tests/properties_tests.rs

use super::{expect_err, get};
use crate::db::listings::{mark_listing_failed, save_listing};
use crate::domain::ScrapedListing;
use crate::errors::ServerError;
use crate::router::{handle, AppState};
use crate::tests::utils::{body_json, body_string, test_state, FixtureFetcher};
use chrono::NaiveDate;

fn listing(id: u32, bedrooms: i64, property_type: &str, price: f64) -> ScrapedListing {
    ScrapedListing {
        external_id: id.to_string(),
        listing_url: format!("https://www.rightmove.co.uk/properties/{id}"),
        title: format!("{id} Mill Lane, London"),
        price: format!("£{price}"),
        price_numeric: Some(price),
        property_type: property_type.to_string(),
        bedrooms: Some(bedrooms),
        bathrooms: Some(1),
        size: "800 sq ft".into(),
        description: format!("A bright home with a garden, number {id}."),
        key_features: vec!["Garden".into(), "Close to station".into()],
        date_added: NaiveDate::from_ymd_opt(2024, 2, 14),
        image_urls: vec![
            format!("https://media.rightmove.co.uk/{id}_0.jpeg"),
            format!("https://media.rightmove.co.uk/{id}_1.jpeg"),
        ],
    }
}

fn seeded_state() -> AppState {
    let state = test_state(FixtureFetcher::default());
    save_listing(&state.db, &listing(1, 2, "Flat", 300_000.0)).unwrap();
    save_listing(&state.db, &listing(2, 3, "Terraced", 550_000.0)).unwrap();
    save_listing(&state.db, &listing(3, 3, "Flat", 410_000.0)).unwrap();
    state
}

#[test]
fn list_returns_stored_rows_with_image_fields() {
    let state = seeded_state();

    let resp = handle(get("/api/properties/"), &state).unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["Content-Type"], "application/json");

    let json = body_json(resp);
    assert_eq!(json["count"], 3);
    assert_eq!(json["num_pages"], 1);

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);

    let first = results
        .iter()
        .find(|r| r["external_id"] == "2")
        .expect("listing 2 should be listed");
    assert_eq!(first["title"], "2 Mill Lane, London");
    assert_eq!(first["price_numeric"], 550_000.0);
    assert_eq!(first["bedrooms"], 3);
    assert_eq!(first["date_added"], "2024-02-14");
    assert_eq!(first["scraping_status"], "completed");
    assert_eq!(first["key_features"][1], "Close to station");
    assert_eq!(first["image_count"], 2);
    assert_eq!(first["primary_image"], "https://media.rightmove.co.uk/2_0.jpeg");
    assert_eq!(first["image_urls"][1], "https://media.rightmove.co.uk/2_1.jpeg");
}

#[test]
fn list_applies_filters_and_pagination() {
    let state = seeded_state();

    let json = body_json(handle(get("/api/properties/?bedrooms=3"), &state).unwrap());
    assert_eq!(json["count"], 2);

    let json = body_json(handle(get("/api/properties/?property_type=flat"), &state).unwrap());
    assert_eq!(json["count"], 2);

    let json = body_json(handle(get("/api/properties/?search=number%202"), &state).unwrap());
    assert_eq!(json["count"], 1);
    assert_eq!(json["results"][0]["external_id"], "2");

    let json = body_json(handle(get("/api/properties/?page=2&page_size=2"), &state).unwrap());
    assert_eq!(json["count"], 3);
    assert_eq!(json["num_pages"], 2);
    assert_eq!(json["results"].as_array().unwrap().len(), 1);

    let json = body_json(handle(get("/api/properties/?page=9"), &state).unwrap());
    assert_eq!(json["count"], 3);
    assert!(json["results"].as_array().unwrap().is_empty());

    let err = expect_err(handle(get("/api/properties/?bedrooms=many"), &state));
    assert!(matches!(err, ServerError::BadRequest(_)));
}

#[test]
fn detail_returns_one_listing_or_404() {
    let state = seeded_state();

    let list = body_json(handle(get("/api/properties/?search=number%201"), &state).unwrap());
    let id = list["results"][0]["id"].as_i64().unwrap();

    let json = body_json(handle(get(&format!("/api/properties/{id}/")), &state).unwrap());
    assert_eq!(json["id"], id);
    assert_eq!(json["external_id"], "1");
    assert_eq!(json["images"].as_array().unwrap().len(), 2);

    let err = expect_err(handle(get("/api/properties/99999/"), &state));
    assert!(matches!(err, ServerError::NotFound));

    let err = expect_err(handle(get("/api/properties/abc/"), &state));
    assert!(matches!(err, ServerError::NotFound));
}

#[test]
fn failed_listing_is_listed_with_its_error() {
    let state = seeded_state();
    mark_listing_failed(
        &state.db,
        "https://www.rightmove.co.uk/properties/1",
        "HTTP 503 from upstream",
    )
    .unwrap();

    let json = body_json(handle(get("/api/properties/?search=number%201"), &state).unwrap());
    let row = &json["results"][0];
    assert_eq!(row["scraping_status"], "failed");
    assert_eq!(row["scraping_error"], "HTTP 503 from upstream");
    assert_eq!(row["price_numeric"], 300_000.0, "earlier data is kept");
}

#[test]
fn home_page_lists_jobs_with_finish_times() {
    let state = test_state(FixtureFetcher::default());
    let (done, waiting) = state
        .db
        .with_conn(|conn| {
            let done = crate::db::jobs::enqueue_job(conn, "https://www.rightmove.co.uk/a", 1)?;
            crate::db::jobs::claim_job(conn, done)?;
            crate::db::jobs::finish_job(conn, done, &Default::default(), None)?;
            let waiting = crate::db::jobs::enqueue_job(conn, "https://www.rightmove.co.uk/b", 1)?;
            Ok((done, waiting))
        })
        .unwrap();

    let finished_at = state
        .db
        .with_conn(|conn| crate::db::jobs::get_job(conn, done))
        .unwrap()
        .unwrap()
        .finished_at
        .unwrap();

    let html = body_string(handle(get("/"), &state).unwrap());
    assert!(html.contains("Finished"));
    assert!(html.contains(&finished_at));
    assert!(html.contains(&format!("/api/jobs/{waiting}/")));
}

#[test]
fn home_page_renders_listings() {
    let state = seeded_state();

    let resp = handle(get("/"), &state).unwrap();
    assert_eq!(resp.status(), 200);

    let html = body_string(resp);
    assert!(html.contains("Scraped Listings"));
    assert!(html.contains("3 Mill Lane, London"));
    assert!(html.contains("https://media.rightmove.co.uk/3_0.jpeg"));
}

#[test]
fn unknown_paths_are_not_found() {
    let state = test_state(FixtureFetcher::default());

    let err = expect_err(handle(get("/nope"), &state));
    assert!(matches!(err, ServerError::NotFound));

    let err = expect_err(handle(
        super::post("/api/properties/", "{}"),
        &state,
    ));
    assert!(matches!(err, ServerError::MethodNotAllowed));
}
