//! Console stand-ins for the voice and language collaborators.
//!
//! [`ConsoleSpeech`] prints what the robot would say and reads typed lines as
//! utterances.  [`DirectIntentSource`] turns a typed line straight into an
//! intent batch, either a JSON object or `type:value` tokens:
//!
//! ```text
//! rover> gesture:wave speech:hello there movement:forward
//! rover> {"speech": "On my way.", "actions": [{"type": "task", "value": "grab:red cube"}]}
//! ```

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use rover_runtime::collaborators::{IntentSource, SpeechIo};
use rover_types::{ActionRecord, IntentBatch, RoverError};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

const PROMPT: &str = "rover> ";

pub struct ConsoleSpeech {
    lines: Mutex<mpsc::Receiver<String>>,
    closed: AtomicBool,
}

impl ConsoleSpeech {
    /// Read utterances from stdin on a dedicated thread.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                print!("{}", PROMPT.bold().cyan());
                stdout.flush().ok();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.blocking_send(line.trim_end().to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            debug!("stdin reader exiting");
        });
        Self::from_channel(rx)
    }

    /// Utterances arrive on `lines`; the input closes when every sender is
    /// dropped.
    pub fn from_channel(lines: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SpeechIo for ConsoleSpeech {
    async fn speak(&self, text: &str) -> Result<(), RoverError> {
        println!("{} {}", "[TTS]".green().bold(), text);
        Ok(())
    }

    async fn listen(&self, timeout: Duration, _phrase_limit: Duration) -> Option<String> {
        let mut lines = self.lines.lock().await;
        match tokio::time::timeout(timeout, lines.recv()).await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                self.closed.store(true, Ordering::Release);
                None
            }
            Err(_) => None,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Direct test input: no language understanding, the operator types the
/// actions.
#[derive(Debug, Default)]
pub struct DirectIntentSource;

#[async_trait]
impl IntentSource for DirectIntentSource {
    async fn interpret(&self, text: &str, _persona: Option<&str>) -> Result<IntentBatch, RoverError> {
        let text = text.trim();
        if text.starts_with('{') {
            return serde_json::from_str(text)
                .map_err(|e| RoverError::Collaborator(format!("bad intent batch: {e}")));
        }
        Ok(IntentBatch {
            speech: String::new(),
            actions: parse_tokens(text)?,
        })
    }
}

/// Split `type:value` tokens on whitespace.  A word without a colon belongs
/// to the previous token's value, so `speech:hello there` is one action.
fn parse_tokens(text: &str) -> Result<Vec<ActionRecord>, RoverError> {
    let mut actions: Vec<ActionRecord> = Vec::new();
    for word in text.split_whitespace() {
        if word.contains(':') {
            actions.push(word.parse()?);
            continue;
        }
        match actions.last_mut() {
            Some(last) => {
                last.value.push(' ');
                last.value.push_str(word);
            }
            None => {
                return Err(RoverError::Collaborator(format!(
                    "expected type:value tokens or a JSON intent batch, got {word:?}"
                )));
            }
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        parse_tokens(text)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn tokens_absorb_trailing_words() {
        assert_eq!(
            tokens("gesture:wave speech:hello there movement:forward"),
            vec!["gesture:wave", "speech:hello there", "movement:forward"]
        );
        assert_eq!(tokens("task:grab:red cube"), vec!["task:grab:red cube"]);
        assert!(tokens("   ").is_empty());
    }

    #[test]
    fn leading_bare_word_is_rejected() {
        assert!(matches!(
            parse_tokens("hello movement:forward"),
            Err(RoverError::Collaborator(_))
        ));
    }

    #[tokio::test]
    async fn json_batches_pass_through() {
        let batch = DirectIntentSource
            .interpret(
                r#"{"speech": "On my way.", "actions": [{"type": "movement", "value": "left"}]}"#,
                None,
            )
            .await
            .unwrap();
        assert_eq!(batch.speech, "On my way.");
        assert_eq!(batch.actions, vec![ActionRecord::new("movement", "left")]);

        let bad = DirectIntentSource.interpret("{not json", None).await;
        assert!(matches!(bad, Err(RoverError::Collaborator(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn console_speech_reads_lines_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let speech = ConsoleSpeech::from_channel(rx);
        let wait = Duration::from_secs(5);

        assert_eq!(speech.listen(wait, wait).await, None);
        assert!(!speech.is_closed());

        tx.send("movement:stop".to_string()).await.unwrap();
        drop(tx);
        assert_eq!(speech.listen(wait, wait).await.as_deref(), Some("movement:stop"));
        assert_eq!(speech.listen(wait, wait).await, None);
        assert!(speech.is_closed());
    }
}
