use anyhow::Result;

/// The tracker processes every event on one thread, so the daemon never needs more than this.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
