//! Lip-sync refinement applied after clip selection.
//!
//! Only [`LipSyncStrategy::Simple`] is complete: the selected clip loops for
//! the length of the audio. The other strategies are extension points and
//! fall back to the simple plan so they never hold up a transition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::library::VideoSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LipSyncStrategy {
    /// Loop the selected clip.
    #[default]
    Simple,
    /// Loop with cut points aligned to speech pauses.
    SmartLoop,
    /// Stitch several clips without visible seams.
    Seamless,
}

/// What the actuator should show for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct LipSyncPlan {
    pub selection: VideoSelection,
    pub strategy: LipSyncStrategy,
    /// Requested playback span of the clip in seconds.
    pub span_secs: f64,
}

/// Refine `selection` for `audio_duration_secs` of speech.
pub fn refine(
    strategy: LipSyncStrategy,
    selection: VideoSelection,
    audio_duration_secs: f64,
) -> LipSyncPlan {
    let span_secs = audio_duration_secs.max(0.0);
    match strategy {
        LipSyncStrategy::Simple => {}
        // TODO: align loop points with pause positions from the synthesis timestamps.
        LipSyncStrategy::SmartLoop | LipSyncStrategy::Seamless => {
            debug!(
                "Lip-sync strategy {:?} has no refinement yet; using a simple loop for '{}'",
                strategy, selection.clip_id
            );
        }
    }
    LipSyncPlan {
        selection,
        strategy: LipSyncStrategy::Simple,
        span_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::library::ClipCategory;

    fn talk() -> VideoSelection {
        VideoSelection {
            clip_id: "talk_01".to_string(),
            category: ClipCategory::Talk,
            detected_emotion: None,
        }
    }

    #[test]
    fn test_every_strategy_passes_selection_through() {
        for strategy in [
            LipSyncStrategy::Simple,
            LipSyncStrategy::SmartLoop,
            LipSyncStrategy::Seamless,
        ] {
            let plan = refine(strategy, talk(), 2.0);
            assert_eq!(plan.selection, talk());
            assert_eq!(plan.span_secs, 2.0);
            assert_eq!(plan.strategy, LipSyncStrategy::Simple);
        }
    }

    #[test]
    fn test_negative_duration_is_clamped() {
        assert_eq!(refine(LipSyncStrategy::Simple, talk(), -1.0).span_secs, 0.0);
    }
}
