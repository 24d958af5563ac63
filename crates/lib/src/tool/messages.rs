//! Parsing of dexer console output into leveled messages.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
  Error,
  Warning,
  Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMessage {
  pub kind: MessageKind,
  pub text: String,
}

const ERROR_PREFIXES: &[&str] = &[
  "error:",
  "ERROR:",
  "UNEXPECTED TOP-LEVEL EXCEPTION",
  "UNEXPECTED TOP-LEVEL ERROR",
  "trouble processing",
  "Uncaught translation error",
];

const WARNING_PREFIXES: &[&str] = &["warning:", "WARNING:", "warn:"];

fn classify_line(line: &str) -> MessageKind {
  if ERROR_PREFIXES.iter().any(|p| line.starts_with(p)) {
    MessageKind::Error
  } else if WARNING_PREFIXES.iter().any(|p| line.starts_with(p)) {
    MessageKind::Warning
  } else {
    MessageKind::Info
  }
}

/// Split tool output into messages.
///
/// Indented lines (stack frames, continuation text) belong to the message
/// above them. `default_kind` applies to lines without a recognized prefix.
pub fn parse_tool_output(output: &str, default_kind: MessageKind) -> Vec<ToolMessage> {
  let mut messages: Vec<ToolMessage> = Vec::new();

  for line in output.lines() {
    if line.trim().is_empty() {
      continue;
    }

    let continuation = line.starts_with(' ') || line.starts_with('\t');
    if continuation && let Some(last) = messages.last_mut() {
      last.text.push('\n');
      last.text.push_str(line.trim_end());
      continue;
    }

    let kind = match classify_line(line) {
      MessageKind::Info => default_kind,
      kind => kind,
    };
    messages.push(ToolMessage {
      kind,
      text: line.trim_end().to_string(),
    });
  }

  messages
}

/// Emit messages through the logger at their level.
pub(crate) fn log_messages(messages: &[ToolMessage]) {
  for message in messages {
    match message.kind {
      MessageKind::Error => error!(target: "predex::tool", "{}", message.text),
      MessageKind::Warning => warn!(target: "predex::tool", "{}", message.text),
      MessageKind::Info => info!(target: "predex::tool", "{}", message.text),
    }
  }
}
