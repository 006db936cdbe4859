#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_engine;

pub use mock_engine::MockEngine;
pub use mock_engine::MockResponse;
pub use mock_engine::RecordedRequest;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use assert_cmd::Command;

pub const TEST_API_VERSION: &str = "1.43";
pub const TEST_CONTAINER_ID: &str = "4f66ad9a0b2e2b2a3e7f8a5d1c9e6b7a8f0d2c4e6a8b0d2f4e6a8c0e2f4a6b8d";

/// Binary invocation pointed at `engine`, isolated from the caller's
/// environment.
pub fn dockwire_cmd(engine: &MockEngine) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dockwire"));
    cmd.env("DOCKER_HOST", engine.host())
        .env("DOCKER_API_VERSION", TEST_API_VERSION)
        .env("NO_COLOR", "1")
        .env_remove("DOCKER_TLS_VERIFY")
        .env_remove("DOCKWIRE_LOG")
        .env_remove("DOCKWIRE_READ_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

pub fn with_timeout<F, T>(duration: Duration, f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });
    rx.recv_timeout(duration).ok()
}
