//! Scripted AT-command dialog.
//!
//! The device under test walks a fixed bring-up chat script; the modem
//! side only needs literal matching against a command table. The table
//! is serde-loadable so a test run can swap in a different modem
//! personality without recompiling.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a chat entry matches an incoming command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// The whole line must equal `command`.
    #[default]
    Exact,
    /// The line must start with `command`.
    Prefix,
}

/// One command/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Command text to match (after trimming CR/LF/NUL).
    pub command: String,
    #[serde(default)]
    pub matcher: Matcher,
    /// Response lines, sent in order, each terminated with CRLF.
    /// An empty list means the command is consumed silently.
    pub responses: Vec<String>,
}

impl ChatEntry {
    fn matches(&self, line: &str) -> bool {
        match self.matcher {
            Matcher::Exact => line == self.command,
            Matcher::Prefix => line.starts_with(&self.command),
        }
    }
}

/// An ordered command table; first matching entry wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatScript {
    pub entries: Vec<ChatEntry>,
}

impl ChatScript {
    /// Parse a script from its JSON representation.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The built-in bring-up dialog of a Quectel-style modem, matching
    /// the chat script the reference cellular driver walks through.
    pub fn quectel_bringup() -> Self {
        fn exact(command: &str, responses: &[&str]) -> ChatEntry {
            ChatEntry {
                command: command.to_string(),
                matcher: Matcher::Exact,
                responses: responses.iter().map(|r| (*r).to_string()).collect(),
            }
        }
        fn prefix(command: &str, responses: &[&str]) -> ChatEntry {
            ChatEntry {
                command: command.to_string(),
                matcher: Matcher::Prefix,
                responses: responses.iter().map(|r| (*r).to_string()).collect(),
            }
        }

        Self {
            entries: vec![
                exact("ATE0", &["OK"]),
                exact("AT+CGSN", &["+CGSN 80008000800", "OK"]),
                prefix("AT+QCFG=", &["OK"]),
                prefix("AT+QDSIM=", &["OK"]),
                exact("AT+QCCID", &["+QCCID: 100010001000", "OK"]),
                prefix("AT+CFUN=", &["OK"]),
                exact("AT+CREG=1", &["OK"]),
                exact("AT+CGREG=1", &["OK"]),
                exact("AT+CEREG=1", &["OK"]),
                exact("AT+CREG?", &["+CREG: 0,5", "OK"]),
                exact("AT+CEREG?", &["+CEREG: 0,5", "OK"]),
                exact("AT+CGREG?", &["+CGREG: 0,5", "OK"]),
                exact("AT+CSQ", &["+CSQ: 20,99", "OK"]),
                // The driver does not wait for a CMUX response; the line is
                // consumed silently and the session switches to mux mode.
                prefix("AT+CMUX=", &[]),
            ],
        }
    }

    /// Find the first entry matching `line`.
    pub fn lookup(&self, line: &str) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.matches(line))
    }
}

/// Matches incoming command lines against a script and renders the
/// response byte stream.
#[derive(Debug, Clone)]
pub struct ChatResponder {
    script: ChatScript,
}

impl ChatResponder {
    /// Create a responder over `script`.
    pub fn new(script: ChatScript) -> Self {
        Self { script }
    }

    /// Strip framing noise the serial link adds around a command line.
    pub fn clean(line: &str) -> &str {
        line.trim_matches(|c| c == '\r' || c == '\n' || c == '\0' || c == ' ')
    }

    /// Respond to one command line. Returns the raw bytes to send back:
    /// each response line CRLF-terminated, `ERROR` for unknown commands,
    /// nothing for silent entries.
    pub fn respond(&self, line: &str) -> Vec<u8> {
        let line = Self::clean(line);
        if line.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        match self.script.lookup(line) {
            Some(entry) => {
                for response in &entry.responses {
                    out.extend_from_slice(response.as_bytes());
                    out.extend_from_slice(b"\r\n");
                }
            }
            None => {
                tracing::warn!(command = line, "unmatched AT command");
                out.extend_from_slice(b"ERROR\r\n");
            }
        }
        out
    }

    /// Whether `line` is the mux-mode switch command.
    pub fn is_cmux_command(line: &str) -> bool {
        Self::clean(line).starts_with("AT+CMUX=")
    }
}
