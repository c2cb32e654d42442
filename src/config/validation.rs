use super::EngineConfig;

/// Validate a merged engine configuration
///
/// Validates that:
/// - the segmenter has a positive chunk size and reading rate
/// - the synthesis queue runs at least one job with a positive timeout
/// - the talking duration range is ordered
/// - buffered mode keeps at least one chunk in flight
/// - the clip library has at least one idle clip
/// - the cache can hold at least one entry
/// - a configured synthesis URL is HTTP or HTTPS
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.segmenter.chunk_size == 0 {
        return Err("segmenter chunk_size must be greater than 0".into());
    }
    if !(config.segmenter.reading_rate > 0.0) {
        return Err(format!(
            "segmenter reading_rate must be positive, got {}",
            config.segmenter.reading_rate
        )
        .into());
    }

    if config.queue.max_concurrent_jobs == 0 {
        return Err("synthesis max_concurrent_jobs must be at least 1".into());
    }
    if config.queue.timeout_ms == 0 {
        return Err("synthesis timeout_ms must be greater than 0".into());
    }

    let video = &config.video;
    if video.min_talking_duration_secs > video.max_talking_duration_secs {
        return Err(format!(
            "video min_talking_duration_secs ({}) exceeds max_talking_duration_secs ({})",
            video.min_talking_duration_secs, video.max_talking_duration_secs
        )
        .into());
    }

    if config.pipeline.max_concurrent_chunks == 0 {
        return Err("pipeline max_concurrent_chunks must be at least 1".into());
    }

    if config.clips.idle.is_empty() {
        return Err("video clips must include at least one idle clip".into());
    }

    if config.cache.max_entries == 0 {
        return Err("cache max_entries must be greater than 0".into());
    }

    let url = &config.synthesis.url;
    if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("synthesis url must use http or https: {url}").into());
    }

    Ok(())
}
