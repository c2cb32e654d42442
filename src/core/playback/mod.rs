//! Sequenced playback of pre-synthesized utterances.

pub mod controller;
pub mod slot;

pub use controller::{
    ActiveCharacter, PlaybackConfig, PlaybackError, PlaybackEvent, PlaybackResult,
    SequencedPlaybackController,
};
pub use slot::{PlaybackContent, PlaybackSlot, SlotState};
