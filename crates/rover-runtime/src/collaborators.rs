//! Seams to the world outside the control core: intent extraction, speech,
//! and vision.  Implementations live in the binary or in [`crate::vision`].

use std::time::Duration;

use async_trait::async_trait;
use rover_types::{ActionRecord, IntentBatch, Observation, RoverError};

/// Turns an utterance into a reply and a batch of action records.
#[async_trait]
pub trait IntentSource: Send + Sync {
    /// # Errors
    ///
    /// [`RoverError::Collaborator`] when the utterance cannot be interpreted.
    async fn interpret(&self, text: &str, persona: Option<&str>) -> Result<IntentBatch, RoverError>;
}

/// Voice in, voice out.
#[async_trait]
pub trait SpeechIo: Send + Sync {
    /// # Errors
    ///
    /// [`RoverError::Collaborator`] when the text cannot be spoken.
    async fn speak(&self, text: &str) -> Result<(), RoverError>;

    /// Wait up to `timeout` for an utterance lasting at most `phrase_limit`.
    /// `None` on silence or when no more input will arrive.
    async fn listen(&self, timeout: Duration, phrase_limit: Duration) -> Option<String>;

    /// `true` once the input side is exhausted and `listen` will never yield
    /// again.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Scene understanding.
#[async_trait]
pub trait Vision: Send + Sync {
    /// A spoken description of the scene, or of `label` if given.
    async fn describe(&self, label: Option<&str>) -> String;

    /// Actions that approach and pick up `label`.
    async fn plan_grab(&self, label: &str) -> Vec<ActionRecord>;

    async fn observations(&self) -> Vec<Observation>;
}
