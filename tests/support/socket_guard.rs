//! Skips socket-bound tests when localhost binding is unavailable.
//!
//! Some sandboxes forbid binding even to loopback. Tests that need a mock HTTP
//! server call [`start_mock_server_or_skip`] and return early on `None`. Set
//! `IMGBULK_REQUIRE_SOCKET_TESTS=1` to turn the skip into a failure.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "IMGBULK_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV).is_ok_and(|value| value == "1")
}

/// Starts a mock server, or returns `None` when loopback sockets are blocked.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => drop(listener),
        Err(e) => {
            assert!(
                !sockets_required(),
                "{REQUIRE_ENV}=1 but binding 127.0.0.1 failed: {e}"
            );
            eprintln!("skipping socket-bound test: cannot bind 127.0.0.1 ({e})");
            return None;
        }
    }
    Some(MockServer::start().await)
}

/// Return value for a skipped test.
pub fn socket_skip_return() {}
