//! Keeps internal attachment identifiers out of user-visible answers.

use std::collections::HashSet;

use tracing::warn;

use super::message::Message;

/// Instruction appended to the turn when an answer leaks an identifier.
pub const LEAK_CORRECTION: &str = "Your last answer exposed an internal file identifier. \
Don't leak identifiers to users. When a tool needs a file, call it with the verbatim ID instead, \
then answer without mentioning the ID.";

const SEPARATORS: [char; 3] = [' ', '_', '-'];
const TRUNCATED_SUFFIX: usize = 10;

/// Per-turn guard. Each identifier triggers at most one correction.
#[derive(Debug, Default)]
pub struct LeakGuard {
    corrected: HashSet<String>,
}

impl LeakGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `answer` for leaked identifiers.
    ///
    /// Returns the corrective system message when an identifier that has not
    /// been corrected yet shows up in any of its forms.
    pub fn check(&mut self, answer: &str, identifiers: &[String]) -> Option<Message> {
        let compact_answer = strip_separators(answer);

        let leaked: Vec<&String> = identifiers
            .iter()
            .filter(|id| !id.is_empty() && !self.corrected.contains(id.as_str()))
            .filter(|id| leaks(answer, &compact_answer, id))
            .collect();

        if leaked.is_empty() {
            return None;
        }

        for id in leaked {
            warn!(identifier = %id, "Answer leaked an attachment identifier, asking for a correction");
            self.corrected.insert(id.clone());
        }
        Some(Message::system(LEAK_CORRECTION))
    }
}

fn strip_separators(text: &str) -> String {
    text.chars().filter(|c| !SEPARATORS.contains(c)).collect()
}

fn leaks(answer: &str, compact_answer: &str, id: &str) -> bool {
    if answer.contains(id) {
        return true;
    }

    let compact_id = strip_separators(id);
    if !compact_id.is_empty() && compact_answer.contains(&compact_id) {
        return true;
    }

    truncated(id).is_some_and(|prefix| answer.contains(prefix))
}

/// The identifier without its last ten characters, if anything remains.
fn truncated(id: &str) -> Option<&str> {
    let chars = id.chars().count();
    if chars <= TRUNCATED_SUFFIX {
        return None;
    }
    let (cut, _) = id.char_indices().nth(chars - TRUNCATED_SUFFIX)?;
    Some(&id[..cut])
}
