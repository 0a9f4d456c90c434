//! Parsing of the interactive prompt's input lines.
//!
//! A plain line is sent as a message. Lines starting with `/` are commands.

use std::path::PathBuf;

/// Shortcodes accepted by `/emoji`.
pub const EMOJI: &[(&str, &str)] = &[
    ("smile", "😀"),
    ("laugh", "😂"),
    ("wink", "😉"),
    ("heart", "❤️"),
    ("thumbsup", "👍"),
    ("wave", "👋"),
    ("thinking", "🤔"),
    ("sad", "😢"),
    ("party", "🎉"),
    ("fire", "🔥"),
];

pub const HELP: &str = "\
Type a message and press Enter to send it.
  /correct [text]      correct the grammar of text (or of the draft)
  /record              start or stop voice input
  /emoji <name|glyph>  append an emoji to the draft
  /draft <text>        replace the draft
  /send                send the draft
  /history             print the whole conversation
  /status              show session status and draft
  /speak <text> <file> synthesize speech into a file
  /quit                exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Correct(Option<String>),
    ToggleRecording,
    Emoji(String),
    Draft(String),
    SendDraft,
    History,
    Status,
    Speak { text: String, path: PathBuf },
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown emoji '{0}'")]
    UnknownEmoji(String),
}

/// Parse one line of input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Submit(line.trim_end_matches(['\r', '\n']).to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "correct" => Command::Correct((!arg.is_empty()).then(|| arg.to_string())),
        "record" => Command::ToggleRecording,
        "emoji" => {
            if arg.is_empty() {
                return Err(CommandError::Usage("/emoji <name|glyph>"));
            }
            Command::Emoji(resolve_emoji(arg)?)
        }
        "draft" => Command::Draft(arg.to_string()),
        "send" => Command::SendDraft,
        "history" => Command::History,
        "status" => Command::Status,
        "speak" => {
            let (text, path) = arg
                .rsplit_once(char::is_whitespace)
                .map(|(text, path)| (text.trim(), path))
                .filter(|(text, _)| !text.is_empty())
                .ok_or(CommandError::Usage("/speak <text> <file>"))?;
            Command::Speak {
                text: text.to_string(),
                path: PathBuf::from(path),
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Map a shortcode to its glyph. Non-ASCII input is taken as a glyph already.
pub fn resolve_emoji(name: &str) -> Result<String, CommandError> {
    let key = name.trim_matches(':').to_lowercase();
    if let Some((_, glyph)) = EMOJI.iter().find(|(code, _)| *code == key) {
        return Ok(glyph.to_string());
    }
    if !name.is_ascii() {
        return Ok(name.to_string());
    }
    Err(CommandError::UnknownEmoji(name.to_string()))
}
