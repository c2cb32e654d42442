//! Small helpers shared across the engine.

/// Get current time in milliseconds since Unix epoch.
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Split a `"{scope}:{index}"` identifier into its parts.
///
/// Job ids and playback item ids produced by the pipeline use this shape so
/// that events coming back from the queue can be routed to their session.
pub fn split_scoped_id(id: &str) -> Option<(&str, usize)> {
    let (scope, index) = id.rsplit_once(':')?;
    let index = index.parse::<usize>().ok()?;
    Some((scope, index))
}

/// Build a `"{scope}:{index}"` identifier.
pub fn scoped_id(scope: &str, index: usize) -> String {
    format!("{scope}:{index}")
}
