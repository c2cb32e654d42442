use super::EngineConfig;
use super::merge::merge_config;
use super::validation::validate_engine_config;

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Reads every section from environment variables, with defaults for
    /// anything unset. Also loads from .env file if present using dotenvy.
    ///
    /// # Returns
    /// * `Result<Self, Box<dyn std::error::Error>>` - The loaded configuration or an error
    ///
    /// # Errors
    /// Returns an error if:
    /// - An environment variable is set but malformed
    /// - Configuration validation fails
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate_engine_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::SyncMode;
    use serial_test::serial;
    use std::env;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("PIPELINE_SYNC_MODE");
            env::remove_var("PIPELINE_MAX_CONCURRENT_CHUNKS");
            env::remove_var("SYNTHESIS_URL");
            env::remove_var("VIDEO_MIN_TALK_SECS");
            env::remove_var("VIDEO_MAX_TALK_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PIPELINE_SYNC_MODE", "manual");
            env::set_var("SYNTHESIS_URL", "http://localhost:9000/speak");
        }

        let config = EngineConfig::from_env().expect("valid env config");
        assert_eq!(config.pipeline.sync_mode, SyncMode::Manual);
        assert!(config.has_synthesis_endpoint());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_validates() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PIPELINE_MAX_CONCURRENT_CHUNKS", "0");
        }
        assert!(EngineConfig::from_env().is_err());
        cleanup_env_vars();

        unsafe {
            env::set_var("VIDEO_MIN_TALK_SECS", "10");
            env::set_var("VIDEO_MAX_TALK_SECS", "5");
        }
        assert!(EngineConfig::from_env().is_err());
        cleanup_env_vars();
    }
}
