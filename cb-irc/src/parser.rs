//! Line-level grammar: tags, origin, command, remainder.
//!
//! Knows nothing about what a command means; see `event` for that.

use crate::error::ParseError;
use std::collections::HashMap;

pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowLevelRecord {
    pub tags: Option<Tags>,
    pub origin: Option<String>,
    pub command: String,
    pub remainder: String,
}

/// Parse a frame that may carry several CRLF-joined lines.
///
/// Each line is parsed on its own, so one bad line never hides its siblings.
pub fn parse_batch(raw: &str) -> Vec<Result<LowLevelRecord, ParseError>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

pub fn parse_line(line: &str) -> Result<LowLevelRecord, ParseError> {
    let original = line;
    let mut rest = line.trim();
    let mut tags = None;

    if let Some(tagged) = rest.strip_prefix('@') {
        let (raw_tags, after) = tagged
            .split_once(' ')
            .ok_or_else(|| ParseError::new(original, "tag segment without message"))?;
        tags = Some(parse_tags(original, raw_tags)?);
        rest = after.trim_start();
    }

    let (origin, command, remainder) = if let Some(sourced) = rest.strip_prefix(':') {
        let (origin, command_part) = sourced
            .split_once(' ')
            .ok_or_else(|| ParseError::new(original, "origin without command"))?;
        let (command, remainder) = command_part.split_once(' ').unwrap_or((command_part, ""));
        (Some(origin.to_string()), command, remainder)
    } else {
        // PING :tmi.twitch.tv
        rest.split_once(':').map_or((None, rest, ""), |(c, r)| (None, c, r))
    };

    let command = command.trim();
    if command.is_empty() {
        return Err(ParseError::new(original, "empty command"));
    }

    Ok(LowLevelRecord {
        tags,
        origin,
        command: command.to_string(),
        remainder: remainder.trim().to_string(),
    })
}

fn parse_tags(line: &str, raw: &str) -> Result<Tags, ParseError> {
    let mut tags = Tags::new();
    for pair in raw.split(';').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ParseError::new(line, format!("tag {pair:?} has no value")))?;
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(tags)
}
