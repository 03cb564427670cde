use tracing_subscriber::EnvFilter;

/// Initialise a stdout `tracing` subscriber. `RUST_LOG` overrides `log_level`
/// when set, matching the teacher's convention of treating the environment
/// as the final authority over a configured default.
pub fn init_tracing(log_level: &str, show_target: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber =
        tracing_subscriber::fmt().with_env_filter(env_filter).with_target(show_target).finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to set global tracing subscriber: {e}"))?;
    Ok(())
}
