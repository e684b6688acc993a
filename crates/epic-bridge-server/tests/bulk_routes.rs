//! Bulk `$export` kick-off, status and download.

mod common;

use axum::http::StatusCode;
use common::{R4, encode, setup};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn bulk_export_returns_content_location() {
    let ctx = setup().await;
    ctx.mount_token().await;
    let status_url = ctx.url(&format!("{R4}/BulkRequest/job-1"));
    Mock::given(method("GET"))
        .and(path(format!("{R4}/Group/G1/$export")))
        .and(query_param("_type", "Patient"))
        .and(header("prefer", "respond-async"))
        .respond_with(
            ResponseTemplate::new(202).insert_header("content-location", status_url.as_str()),
        )
        .expect(1)
        .mount(&ctx.epic)
        .await;

    let res = ctx.get("/bulk-export?groupId=G1&types=Patient").await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["statusUrl"], status_url);
}

#[tokio::test]
async fn bulk_export_forwards_type_list_verbatim() {
    let ctx = setup().await;
    ctx.mount_token().await;
    Mock::given(method("GET"))
        .and(path(format!("{R4}/Group/G1/$export")))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", ctx.url("/status/1").as_str()),
        )
        .expect(1)
        .mount(&ctx.epic)
        .await;

    let res = ctx
        .get("/bulk-export?groupId=G1&types=Patient,Observation")
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let requests = ctx.fhir_requests().await;
    assert_eq!(requests[0].url.query(), Some("_type=Patient,Observation"));
}

#[tokio::test]
async fn bulk_export_without_content_location_fails() {
    let ctx = setup().await;
    ctx.mount_token().await;
    Mock::given(method("GET"))
        .and(path(format!("{R4}/Group/G1/$export")))
        .respond_with(ResponseTemplate::new(202))
        .mount(&ctx.epic)
        .await;

    let res = ctx.get("/bulk-export?groupId=G1").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.json()["message"],
        "No Content-Location header in export response"
    );

    let requests = ctx.fhir_requests().await;
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn bulk_routes_require_their_parameters() {
    let ctx = setup().await;

    for (uri, field) in [
        ("/bulk-export", "groupId"),
        ("/bulk-export?groupId=", "groupId"),
        ("/bulk-status", "statusUrl"),
        ("/bulk-download", "fileUrl"),
    ] {
        let res = ctx.get(uri).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(res.json()["message"], format!("{field} is required"));
    }
    assert!(ctx.epic.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_status_reports_progress_then_manifest() {
    let ctx = setup().await;
    ctx.mount_token().await;
    let status_url = ctx.url(&format!("{R4}/BulkRequest/job-1"));

    Mock::given(method("GET"))
        .and(path(format!("{R4}/BulkRequest/job-1")))
        .respond_with(ResponseTemplate::new(202).insert_header("x-progress", "50%"))
        .up_to_n_times(1)
        .mount(&ctx.epic)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{R4}/BulkRequest/job-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transactionTime": "2024-03-01T12:00:00Z",
            "output": [{"type": "Patient", "url": ctx.url("/files/Patient.ndjson")}]
        })))
        .mount(&ctx.epic)
        .await;

    let uri = format!("/bulk-status?statusUrl={}", encode(&status_url));

    let res = ctx.get(&uri).await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["data"]["status"], "in-progress");
    assert_eq!(body["data"]["progress"], "50%");

    let res = ctx.get(&uri).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["data"]["output"][0]["type"], "Patient");
}

#[tokio::test]
async fn bulk_download_streams_file() {
    let ctx = setup().await;
    ctx.mount_token().await;
    let ndjson = "{\"resourceType\":\"Patient\",\"id\":\"1\"}\n{\"resourceType\":\"Patient\",\"id\":\"2\"}\n";
    Mock::given(method("GET"))
        .and(path("/files/Patient.ndjson"))
        .and(header("authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/fhir+ndjson"))
        .expect(1)
        .mount(&ctx.epic)
        .await;

    let file_url = ctx.url("/files/Patient.ndjson");
    let res = ctx
        .get(&format!("/bulk-download?fileUrl={}", encode(&file_url)))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.headers["content-type"].to_str().unwrap(),
        "application/fhir+ndjson"
    );
    assert_eq!(
        res.headers["content-disposition"].to_str().unwrap(),
        "attachment; filename=\"Patient.ndjson\""
    );
    assert_eq!(&res.body[..], ndjson.as_bytes());
}

#[tokio::test]
async fn foreign_urls_are_rejected_without_network() {
    let ctx = setup().await;

    let res = ctx
        .get(&format!(
            "/bulk-status?statusUrl={}",
            encode("https://attacker.example.com/collect")
        ))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["success"], false);

    let res = ctx
        .get(&format!("/bulk-download?fileUrl={}", encode("file:///etc/passwd")))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    assert!(ctx.epic.received_requests().await.unwrap().is_empty());
}
