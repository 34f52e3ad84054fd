//! Outbound protocol lines.

pub const CAPABILITIES: &[&str] = &[
    "twitch.tv/tags",
    "twitch.tv/commands",
    "twitch.tv/membership",
];

pub fn pass(access_token: &str) -> String {
    format!("PASS oauth:{access_token}")
}

pub fn nick(identity: &str) -> String {
    format!("NICK {identity}")
}

pub fn cap_req(capabilities: &[&str]) -> String {
    format!("CAP REQ :{}", capabilities.join(" "))
}

pub fn join(channel: &str) -> String {
    format!("JOIN #{channel}")
}

pub fn pong(payload: &str) -> String {
    format!("PONG {payload}")
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{channel} :{}", single_line(text))
}

/// Line breaks would start a new protocol command, so they become spaces.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_lines_match_the_wire_format() {
        assert_eq!(pass("abc123"), "PASS oauth:abc123");
        assert_eq!(nick("bot"), "NICK bot");
        assert_eq!(
            cap_req(CAPABILITIES),
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership"
        );
        assert_eq!(join("thebobbyv"), "JOIN #thebobbyv");
        assert_eq!(pong("tmi.twitch.tv"), "PONG tmi.twitch.tv");
    }

    #[test]
    fn privmsg_cannot_smuggle_extra_lines() {
        assert_eq!(
            privmsg("chan", "hi\r\nJOIN #elsewhere"),
            "PRIVMSG #chan :hi  JOIN #elsewhere"
        );
    }
}
