//! Hub-to-device commands and their acknowledgements.

use std::fmt;

use crate::constants::{ACK_MESSAGE, QUIT_DIRECTIVE};

/// A command sent from the hub to a device.
///
/// Two shapes are recognised; any other text is a generic command that
/// devices still acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `SET_INTERVAL <seconds>`
    SetInterval(u32),
    /// `ACTIVATE_ALARM`
    ActivateAlarm,
    Generic(String),
}

impl Directive {
    /// Classifies a command string.
    ///
    /// `SET_INTERVAL` with a missing or non-integer argument is treated as
    /// a generic command.
    pub fn parse(command: &str) -> Self {
        let command = command.trim();
        let mut tokens = command.split_whitespace();

        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some("ACTIVATE_ALARM"), None, _) => Directive::ActivateAlarm,
            (Some("SET_INTERVAL"), Some(arg), None) => match arg.parse::<u32>() {
                Ok(secs) => Directive::SetInterval(secs),
                Err(_) => Directive::Generic(command.to_string()),
            },
            _ => Directive::Generic(command.to_string()),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::SetInterval(_) => "set_interval",
            Directive::ActivateAlarm => "activate_alarm",
            Directive::Generic(_) => "generic",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::SetInterval(secs) => write!(f, "SET_INTERVAL {secs}"),
            Directive::ActivateAlarm => f.write_str("ACTIVATE_ALARM"),
            Directive::Generic(text) => f.write_str(text),
        }
    }
}

/// Returns `true` if the operator asked to end the session.
pub fn is_quit(command: &str) -> bool {
    command.trim().eq_ignore_ascii_case(QUIT_DIRECTIVE)
}

/// Encodes a command for the wire (newline terminated).
pub fn encode_command(command: &str) -> Vec<u8> {
    format!("{}\n", command.trim()).into_bytes()
}

/// Encodes the fixed acknowledgement line (device side).
pub fn encode_ack() -> Vec<u8> {
    format!("{ACK_MESSAGE}\n").into_bytes()
}

/// Decodes an acknowledgement.
///
/// Returns the trimmed text and whether it matched the expected ack line.
/// Unexpected text is still reported to the caller rather than rejected.
pub fn decode_ack(bytes: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    let expected = text == ACK_MESSAGE;
    (text, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_interval() {
        assert_eq!(Directive::parse("SET_INTERVAL 5"), Directive::SetInterval(5));
        assert_eq!(Directive::parse(" SET_INTERVAL  30 \n"), Directive::SetInterval(30));
    }

    #[test]
    fn parse_set_interval_bad_argument_is_generic() {
        assert_eq!(
            Directive::parse("SET_INTERVAL fast"),
            Directive::Generic("SET_INTERVAL fast".into())
        );
        assert_eq!(
            Directive::parse("SET_INTERVAL"),
            Directive::Generic("SET_INTERVAL".into())
        );
        assert_eq!(
            Directive::parse("SET_INTERVAL -1"),
            Directive::Generic("SET_INTERVAL -1".into())
        );
    }

    #[test]
    fn parse_activate_alarm() {
        assert_eq!(Directive::parse("ACTIVATE_ALARM"), Directive::ActivateAlarm);
        assert_eq!(
            Directive::parse("ACTIVATE_ALARM now"),
            Directive::Generic("ACTIVATE_ALARM now".into())
        );
    }

    #[test]
    fn parse_generic() {
        let d = Directive::parse("REBOOT");
        assert_eq!(d, Directive::Generic("REBOOT".into()));
        assert_eq!(d.kind(), "generic");
        assert_eq!(d.to_string(), "REBOOT");
    }

    #[test]
    fn display_matches_wire_text() {
        assert_eq!(Directive::SetInterval(3).to_string(), "SET_INTERVAL 3");
        assert_eq!(Directive::ActivateAlarm.to_string(), "ACTIVATE_ALARM");
    }

    #[test]
    fn quit_is_case_insensitive() {
        assert!(is_quit("quit"));
        assert!(is_quit("QUIT"));
        assert!(is_quit("  Quit \n"));
        assert!(!is_quit("quit now"));
        assert!(!is_quit("SET_INTERVAL 5"));
    }

    #[test]
    fn encode_command_terminates_line() {
        assert_eq!(encode_command("ACTIVATE_ALARM"), b"ACTIVATE_ALARM\n");
        assert_eq!(encode_command("  SET_INTERVAL 5 "), b"SET_INTERVAL 5\n");
    }

    #[test]
    fn ack_decodes_as_expected() {
        let (text, ok) = decode_ack(&encode_ack());
        assert_eq!(text, "ACK Command Executed");
        assert!(ok);
    }

    #[test]
    fn unexpected_ack_is_reported() {
        let (text, ok) = decode_ack(b"NACK busy\r\n");
        assert_eq!(text, "NACK busy");
        assert!(!ok);
    }
}
