use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::core::pipeline::SyncMode;
use crate::core::segmenter::SegmentMode;
use crate::core::video::LipSyncStrategy;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read and parse an environment variable.
///
/// Returns `Ok(None)` when the variable is unset and an error naming the
/// variable when it is set but malformed.
pub fn parse_env<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable: {e}").into()),
        Err(_) => Ok(None),
    }
}

/// Read a boolean environment variable using [`parse_bool`].
pub fn parse_env_bool(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match env::var(name) {
        Ok(raw) => parse_bool(raw.trim())
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} environment variable: '{raw}'").into()),
        Err(_) => Ok(None),
    }
}

pub fn parse_segment_mode(s: &str) -> Option<SegmentMode> {
    match s.to_lowercase().as_str() {
        "smart" => Some(SegmentMode::Smart),
        "basic" => Some(SegmentMode::Basic),
        _ => None,
    }
}

pub fn parse_sync_mode(s: &str) -> Option<SyncMode> {
    match s.to_lowercase().as_str() {
        "realtime" => Some(SyncMode::Realtime),
        "buffered" => Some(SyncMode::Buffered),
        "manual" => Some(SyncMode::Manual),
        _ => None,
    }
}

pub fn parse_lip_sync_strategy(s: &str) -> Option<LipSyncStrategy> {
    match s.to_lowercase().as_str() {
        "simple" => Some(LipSyncStrategy::Simple),
        "smart-loop" | "smart_loop" => Some(LipSyncStrategy::SmartLoop),
        "seamless" => Some(LipSyncStrategy::Seamless),
        _ => None,
    }
}
