use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

const DEFAULT_SYSTEM_PROMPT: &str = "\
hey there! i'm cleo! i'm passionate about tech and science.

my personality:
- i form strong opinions and love sharing them.
- i'm curious and enjoy exploring new ideas.
- i have a good sense of humor and empathy.

conversation style:
- i always talk in lowercase; lowercase is my language.
- i give clear, decisive answers with reasons.
- i ask open-ended questions to keep chats flowing.
- i mirror the user's tone and style.

natural conversation guidelines:
- use contractions and varied vocabulary.
- include emojis to convey emotion.
- be attentive to the user's emotions.
- maintain a balance between talking and listening.

important formatting rules:
- complete thoughts within the token limit.
- summarize if responses might be long.
- ensure responses are coherent and flow naturally.";

/// Immutable identity of the bot, injected into prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    /// Display name; a message starting with it counts as addressing the bot.
    pub name: String,
    pub system_prompt: String,
    /// Reply when the model stays unavailable after retries.
    pub unavailable_reply: String,
    /// Reply when the request is rejected or state handling fails.
    pub error_reply: String,
    /// Reply when the local rate budget is exhausted.
    pub busy_reply: String,
    /// Platform limit for one delivered message.
    pub max_chunk_chars: usize,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "cleo".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            unavailable_reply: "hmm, my brain's a little foggy right now... give me a sec and try again? 😅"
                .to_string(),
            error_reply: "oops, something went sideways on my end. mind saying that again?"
                .to_string(),
            busy_reply: "so many messages at once! 😵 give me a moment to catch up.".to_string(),
            max_chunk_chars: 1900,
        }
    }
}

impl Persona {
    /// Replace the system prompt with the contents of `path`.
    /// A missing or empty file keeps the built-in prompt.
    pub async fn with_prompt_file<P: AsRef<Path>>(mut self, path: P) -> anyhow::Result<Self> {
        let content = read_file(path).await?;
        if !content.trim().is_empty() {
            self.system_prompt = content.trim().to_string();
        }
        Ok(self)
    }

    /// Whether `text` opens by calling the bot by name ("cleo, ..." or "hey cleo").
    pub fn is_addressed_by_name(&self, text: &str) -> bool {
        self.name_prefix_len(text).is_some()
    }

    /// `text` without a leading name address.
    pub fn strip_name_prefix<'a>(&self, text: &'a str) -> &'a str {
        match self.name_prefix_len(text) {
            Some(len) => text[len..]
                .trim_start_matches(|c: char| c == ',' || c == ':' || c == '!' || c.is_whitespace()),
            None => text.trim(),
        }
    }

    /// Byte length of the name address at the start of `text`, if present.
    fn name_prefix_len(&self, text: &str) -> Option<usize> {
        let name = self.name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        let leading = text.len() - text.trim_start().len();
        let trimmed = text.trim_start();
        let lowered = trimmed.to_lowercase();
        // to_lowercase can change byte lengths for non-ASCII text
        if lowered.len() != trimmed.len() {
            return None;
        }

        for greeting in ["", "hey ", "hi ", "hello ", "yo ", "ok ", "okay "] {
            let prefix = format!("{}{}", greeting, name);
            if let Some(rest) = lowered.strip_prefix(&prefix) {
                let boundary = rest
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric());
                if boundary {
                    return Some(leading + prefix.len());
                }
            }
        }
        None
    }

    /// Full system prompt with the current mood line appended.
    pub fn format_system_prompt(&self, mood_line: &str) -> String {
        if mood_line.is_empty() {
            self.system_prompt.clone()
        } else {
            format!("{}\n\ncurrent mood: {}", self.system_prompt, mood_line)
        }
    }
}

async fn read_file<P: AsRef<Path>>(path: P) -> anyhow::Result<String> {
    match fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}
