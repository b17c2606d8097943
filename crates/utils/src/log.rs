use std::fmt::Display;

use tracing_subscriber::{EnvFilter, prelude::*};

/// Install the process-wide subscriber. Level comes from `RUST_LOG`, defaulting
/// to `default_level`, and is scoped to this workspace's crates.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let filter_string = format!("warn,workspace_git={log_level},utils={log_level}");
    let env_filter = EnvFilter::try_new(filter_string).unwrap_or_else(|e| {
        eprintln!("Invalid RUST_LOG value ({e}); falling back to info");
        EnvFilter::new("warn,workspace_git=info,utils=info")
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .try_init()
}

/// Run `f`, logging `description` before and the outcome after.
pub fn traced<T, E, F>(description: impl Display, f: F) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    tracing::debug!("{description}");
    let result = f();
    match &result {
        Ok(_) => tracing::debug!("{description}: ok"),
        Err(e) => tracing::debug!("{description}: failed: {e}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traced_passes_results_through() {
        let ok: Result<u8, String> = traced("answer", || Ok(42));
        assert_eq!(ok, Ok(42));
        let err: Result<u8, String> = traced("broken", || Err("nope".to_string()));
        assert_eq!(err, Err("nope".to_string()));
    }
}
