use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cinestats::aggregate::TrendConfig;
use cinestats::app::{build_router, AppState};
use cinestats::config::Settings;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::util::ServiceExt;

const CATALOG: &str = "\
show_id,type,title,director,cast,country,date_added,release_year,rating,duration,listed_in
s1,Movie,First,Jane Doe,\"Actor A, Actor B\",\"United States, India\",\"January 1, 2020\",2019,PG,\"100 min\",\"Comedy, Drama\"
s2,TV Show,Second,,Actor A,India,\"March 3, 2021\",2020,TV-MA,2 Seasons,Drama
s3,Movie,Third,Jane Doe,,United States,,2021,R,80 min,Horror
";

fn settings(path: PathBuf) -> Settings {
    Settings {
        catalog_path: path,
        addr: "127.0.0.1:0".parse().unwrap(),
        trend: TrendConfig::default(),
    }
}

fn app_with_catalog(body: &str) -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("titles.csv");
    std::fs::write(&path, body).unwrap();
    (build_router(AppState::new(settings(path))), dir)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn keys(rows: &Value) -> Vec<(String, u64)> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["key"].as_str().unwrap().to_string(),
                r["count"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn options_list_observed_values() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/options").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["year_min"], 2019);
    assert_eq!(body["year_max"], 2021);
    assert_eq!(body["content_types"], serde_json::json!(["Movie", "Series"]));
    assert_eq!(body["ratings"], serde_json::json!(["PG", "R", "TV-MA"]));
    assert_eq!(body["report"]["loaded"], 3);
}

#[tokio::test]
async fn unfiltered_tables_cover_every_entry() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/tables").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["movies"], 2);
    assert_eq!(body["series"], 1);
    assert_eq!(
        keys(&body["top_genres"]),
        vec![
            ("Drama".to_string(), 2),
            ("Comedy".to_string(), 1),
            ("Horror".to_string(), 1)
        ]
    );
    assert_eq!(
        keys(&body["top_countries"]),
        vec![("India".to_string(), 2), ("United States".to_string(), 2)]
    );
    assert_eq!(keys(&body["top_directors"]), vec![("Jane Doe".to_string(), 2)]);
    assert_eq!(keys(&body["top_actors"])[0], ("Actor A".to_string(), 2));
    assert_eq!(body["added_by_year"].as_array().unwrap().len(), 2);
    assert_eq!(
        keys(&body["added_by_month"]),
        vec![("January".to_string(), 1), ("March".to_string(), 1)]
    );
    assert_eq!(body["duration_by_type"][0]["unit"], "minutes");
    assert_eq!(body["duration_by_type"][0]["median"], 90.0);
    assert_eq!(body["duration_by_type"][1]["unit"], "seasons");
}

#[tokio::test]
async fn filters_narrow_the_tables() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/tables?year_min=2019&year_max=2019").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys(&body["by_type"]), vec![("Movie".to_string(), 1)]);
    assert_eq!(
        keys(&body["top_genres"]),
        vec![("Comedy".to_string(), 1), ("Drama".to_string(), 1)]
    );

    let (app, _dir) = app_with_catalog(CATALOG);
    let (_, body) = get_json(app, "/api/tables?types=TV%20Show&ratings=TV-MA").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["series"], 1);
}

#[tokio::test]
async fn empty_selection_is_not_an_error() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/tables?ratings=NC-17").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert!(body["top_genres"].as_array().unwrap().is_empty());
    assert!(body["by_release_year"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_filters_are_rejected() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/tables?types=Podcast").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, _) = get_json(app, "/api/tables?year_min=2021&year_max=2019").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entries_are_paginated() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (status, body) = get_json(app, "/api/entries?types=Movie&limit=1&offset=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["title"], "Third");
    assert_eq!(entries[0]["duration"]["unit"], "minutes");
    assert_eq!(entries[0]["duration"]["value"], 80);
}

#[tokio::test]
async fn schema_mismatch_maps_to_unprocessable() {
    let (app, _dir) = app_with_catalog("type,release_year\nMovie,2020\n");
    let (status, body) = get_json(app, "/api/tables").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn missing_file_maps_to_unavailable() {
    let dir = TempDir::new().unwrap();
    let app = build_router(AppState::new(settings(dir.path().join("missing.csv"))));
    let (status, body) = get_json(app, "/api/options").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn refresh_reloads_the_file() {
    let (app, dir) = app_with_catalog(CATALOG);
    let (_, body) = get_json(app.clone(), "/api/tables").await;
    assert_eq!(body["total"], 3);

    let path = dir.path().join("titles.csv");
    let extra = format!("{CATALOG}s4,Movie,Fourth,,,,,2018,G,70 min,Family\n");
    std::fs::write(&path, extra).unwrap();

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, body) = get_json(app, "/api/tables").await;
    assert_eq!(body["total"], 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_load() {
    let (app, _dir) = app_with_catalog(CATALOG);
    let (options, tables, entries) = tokio::join!(
        get_json(app.clone(), "/api/options"),
        get_json(app.clone(), "/api/tables"),
        get_json(app.clone(), "/api/entries"),
    );
    assert_eq!(options.0, StatusCode::OK);
    assert_eq!(tables.0, StatusCode::OK);
    assert_eq!(entries.0, StatusCode::OK);
    assert_eq!(tables.1["total"], options.1["report"]["loaded"]);
    assert_eq!(entries.1["total"], 3);
}
