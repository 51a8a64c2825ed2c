//! Integration tests for the image fetcher against a mock HTTP server.

use std::sync::Arc;

use imgbulk_core::{
    Candidate, FetchError, FetchOutcome, HttpClient, ImageFetcher, Ledger, LedgerState, SaveLimit,
    SkipReason,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};
use support::{GIF, HTML, PNG, PNG_OTHER};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

async fn serve(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

fn fetcher() -> ImageFetcher {
    ImageFetcher::new(
        HttpClient::new().expect("client builds"),
        Arc::new(Ledger::new()),
    )
}

#[tokio::test]
async fn test_saves_image_under_url_basename() {
    let server = require_mock_server!();
    serve(&server, "/img/cat.png", PNG).await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();

    let url = format!("{}/img/cat.png", server.uri());
    let outcome = fetcher
        .fetch(&Candidate::new(&url), dir.path(), SaveLimit::unlimited())
        .await
        .expect("fetch succeeds");

    assert_eq!(
        outcome,
        FetchOutcome::Saved {
            filename: "cat.png".to_string()
        }
    );
    assert_eq!(std::fs::read(dir.path().join("cat.png")).expect("saved"), PNG);
    assert!(fetcher.ledger().has_attempted(&url).await);
}

#[tokio::test]
async fn test_suggested_name_is_slugified() {
    let server = require_mock_server!();
    serve(&server, "/a/123.gif", GIF).await;
    let dir = TempDir::new().expect("temp dir");

    let candidate = Candidate::new(format!("{}/a/123.gif", server.uri()))
        .with_name("Dancing Cat! - Funny GIFs");
    let outcome = fetcher()
        .fetch(&candidate, dir.path(), SaveLimit::unlimited())
        .await
        .expect("fetch succeeds");

    assert_eq!(
        outcome,
        FetchOutcome::Saved {
            filename: "dancing-cat-funny-gifs.gif".to_string()
        }
    );
}

#[tokio::test]
async fn test_identical_content_saved_once() {
    let server = require_mock_server!();
    serve(&server, "/first.png", PNG).await;
    serve(&server, "/mirror.png", PNG).await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();
    let limit = SaveLimit::unlimited();

    let first = fetcher
        .fetch(
            &Candidate::new(format!("{}/first.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("first fetch");
    let second = fetcher
        .fetch(
            &Candidate::new(format!("{}/mirror.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("second fetch");

    assert!(matches!(first, FetchOutcome::Saved { .. }));
    assert_eq!(
        second,
        FetchOutcome::Skipped(SkipReason::DuplicateContent {
            existing: "first.png".to_string()
        })
    );
    assert!(!dir.path().join("mirror.png").exists());
}

#[tokio::test]
async fn test_non_image_body_rejected() {
    let server = require_mock_server!();
    serve(&server, "/photo.jpg", HTML).await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();

    let url = format!("{}/photo.jpg", server.uri());
    let outcome = fetcher
        .fetch(&Candidate::new(&url), dir.path(), SaveLimit::unlimited())
        .await
        .expect("fetch completes");

    assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::InvalidImage));
    assert!(!dir.path().join("photo.jpg").exists());
    assert!(!fetcher.ledger().has_attempted(&url).await);
}

#[tokio::test]
async fn test_attempted_url_makes_no_request() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/seen.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG.to_vec()))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();
    let url = format!("{}/seen.png", server.uri());
    fetcher.ledger().lock().await.record_attempt(&url);

    let outcome = fetcher
        .fetch(&Candidate::new(&url), dir.path(), SaveLimit::unlimited())
        .await
        .expect("fetch completes");

    assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::AlreadyTried));
}

#[tokio::test]
async fn test_name_collision_gets_numbered_suffix() {
    let server = require_mock_server!();
    serve(&server, "/one/cat.png", PNG).await;
    serve(&server, "/two/cat.png", PNG_OTHER).await;
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("cat.png"), b"an older unrelated file").expect("seed");
    let fetcher = fetcher();
    let limit = SaveLimit::unlimited();

    let first = fetcher
        .fetch(
            &Candidate::new(format!("{}/one/cat.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("first fetch");
    let second = fetcher
        .fetch(
            &Candidate::new(format!("{}/two/cat.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("second fetch");

    assert_eq!(
        first,
        FetchOutcome::Saved {
            filename: "cat-1.png".to_string()
        }
    );
    assert_eq!(
        second,
        FetchOutcome::Saved {
            filename: "cat-2.png".to_string()
        }
    );
    assert_eq!(
        std::fs::read(dir.path().join("cat.png")).expect("untouched"),
        b"an older unrelated file"
    );
}

#[tokio::test]
async fn test_identical_file_on_disk_is_skipped() {
    let server = require_mock_server!();
    serve(&server, "/cat.png", PNG).await;
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("cat.png"), PNG).expect("seed");

    let outcome = fetcher()
        .fetch(
            &Candidate::new(format!("{}/cat.png", server.uri())),
            dir.path(),
            SaveLimit::unlimited(),
        )
        .await
        .expect("fetch completes");

    assert_eq!(
        outcome,
        FetchOutcome::Skipped(SkipReason::AlreadySavedOnDisk {
            filename: "cat.png".to_string()
        })
    );
}

#[tokio::test]
async fn test_limit_stops_further_saves() {
    let server = require_mock_server!();
    serve(&server, "/a.png", PNG).await;
    serve(&server, "/b.png", PNG_OTHER).await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();
    let limit = SaveLimit::new(Some(1));

    let first = fetcher
        .fetch(
            &Candidate::new(format!("{}/a.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("first fetch");
    let second = fetcher
        .fetch(
            &Candidate::new(format!("{}/b.png", server.uri())),
            dir.path(),
            limit,
        )
        .await
        .expect("second fetch");

    assert!(matches!(first, FetchOutcome::Saved { .. }));
    assert_eq!(second, FetchOutcome::Skipped(SkipReason::LimitReached));
    assert!(!dir.path().join("b.png").exists());
    assert_eq!(fetcher.ledger().attempted_count().await, 1);
}

#[tokio::test]
async fn test_restored_history_counts_toward_limit() {
    let server = require_mock_server!();
    serve(&server, "/new.png", PNG).await;
    let dir = TempDir::new().expect("temp dir");
    let state = LedgerState::from_parts(
        [
            "https://old.example/1.png".to_string(),
            "https://old.example/2.png".to_string(),
        ],
        Vec::new(),
    );
    let fetcher = ImageFetcher::new(
        HttpClient::new().expect("client builds"),
        Arc::new(Ledger::from_state(state)),
    );

    let outcome = fetcher
        .fetch(
            &Candidate::new(format!("{}/new.png", server.uri())),
            dir.path(),
            SaveLimit::new(Some(2)),
        )
        .await
        .expect("fetch completes");

    assert_eq!(outcome, FetchOutcome::Skipped(SkipReason::LimitReached));
    assert!(!dir.path().join("new.png").exists());
    assert_eq!(fetcher.ledger().attempted_count().await, 2);
}

#[tokio::test]
async fn test_http_error_is_fetch_error_and_not_recorded() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();
    let url = format!("{}/gone.png", server.uri());

    let result = fetcher
        .fetch(&Candidate::new(&url), dir.path(), SaveLimit::unlimited())
        .await;

    assert!(matches!(result, Err(FetchError::HttpStatus { status: 404, .. })));
    assert!(!fetcher.ledger().has_attempted(&url).await);
}

#[tokio::test]
async fn test_concurrent_identical_downloads_write_one_file() {
    let server = require_mock_server!();
    for n in 0..8 {
        serve(&server, &format!("/copy{n}.png"), PNG).await;
    }
    let dir = TempDir::new().expect("temp dir");
    let fetcher = fetcher();

    let mut handles = Vec::new();
    for n in 0..8 {
        let fetcher = fetcher.clone();
        let out = dir.path().to_path_buf();
        let url = format!("{}/copy{n}.png", server.uri());
        handles.push(tokio::spawn(async move {
            fetcher
                .fetch(&Candidate::new(url), &out, SaveLimit::unlimited())
                .await
        }));
    }

    let mut saved = 0;
    for handle in handles {
        match handle.await.expect("task joins").expect("fetch completes") {
            FetchOutcome::Saved { .. } => saved += 1,
            FetchOutcome::Skipped(SkipReason::DuplicateContent { .. }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(saved, 1);
    let files = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn test_missing_output_dir_is_filesystem_error() {
    let server = require_mock_server!();
    serve(&server, "/cat.png", PNG).await;
    let dir = TempDir::new().expect("temp dir");

    let result = fetcher()
        .fetch(
            &Candidate::new(format!("{}/cat.png", server.uri())),
            &dir.path().join("missing"),
            SaveLimit::unlimited(),
        )
        .await;

    assert!(result.is_err_and(|e| e.is_filesystem()));
}
