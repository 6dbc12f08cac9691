//! End-to-end tests for the HTTP endpoint, driven through the router without
//! binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use report_forge::report::ReportOptions;
use report_forge::server::{build_router, AppState};

fn app(options: ReportOptions) -> Router {
    build_router(AppState::new(options))
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn report_endpoint_returns_pdf_attachment() {
    let (status, headers, body) = get(app(ReportOptions::default()), "/reports/pdf").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("ReporteFinal.pdf"), "{disposition}");
    assert!(!body.is_empty());
    assert_eq!(&body[0..5], b"%PDF-");
}

#[tokio::test]
async fn title_query_sets_pdf_title() {
    let (status, _, body) = get(app(ReportOptions::default()), "/reports/pdf?title=Mensual").await;
    assert_eq!(status, StatusCode::OK);

    let doc = lopdf::Document::load_mem(&body).unwrap();
    let info = doc.trailer.get(b"Info").and_then(|o| o.as_reference()).unwrap();
    let title = doc
        .get_dictionary(info)
        .and_then(|d| d.get(b"Title"))
        .and_then(|o| o.as_str())
        .unwrap();
    assert_eq!(title, b"Mensual");
}

#[tokio::test]
async fn malformed_html_returns_500_without_pdf() {
    let options = ReportOptions {
        html: "<html><body><p class='roto>".to_string(),
        ..ReportOptions::default()
    };
    let (status, headers, body) = get(app(options), "/reports/pdf").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_ne!(headers[header::CONTENT_TYPE], "application/pdf");
    assert!(!body.starts_with(b"%PDF-"));

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "ReportFailed");
    assert_eq!(json["message"], "Report generation failed");
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, _, body) = get(app(ReportOptions::default()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (status, _, _) = get(app(ReportOptions::default()), "/reports/xlsx").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
