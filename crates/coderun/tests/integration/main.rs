//! Integration tests for coderun
//!
//! Config loading and dispatch against a scripted stand-in for the docker
//! client run everywhere. Scenarios against a real Docker daemon need the
//! runner images built and are gated behind a feature:
//!
//!   cargo test -p coderun --features integration-tests -- --include-ignored

#[cfg(unix)]
mod dispatch;
#[cfg(all(unix, feature = "integration-tests"))]
mod scenarios;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
#[cfg(feature = "integration-tests")]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}
