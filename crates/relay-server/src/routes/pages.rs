use axum::Router;
use std::path::Path;
use tower_http::services::ServeFile;

/// The camera page and the image analyzer page
pub fn routes(static_dir: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/image", ServeFile::new(static_dir.join("image.html")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_serves_pages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>camera</h1>").unwrap();
        std::fs::write(dir.path().join("image.html"), "<h1>image</h1>").unwrap();

        for (uri, expected) in [("/", "<h1>camera</h1>"), ("/image", "<h1>image</h1>")] {
            let response = routes(dir.path())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let content_type = response.headers()["content-type"].to_str().unwrap();
            assert!(content_type.starts_with("text/html"), "content type for {}", uri);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body, expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_missing_page() {
        let dir = tempfile::tempdir().unwrap();

        let response = routes(dir.path())
            .oneshot(Request::builder().uri("/image").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
