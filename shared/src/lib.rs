//! Wire protocol shared by the hangman server and its clients.
//!
//! Every logical event is one line of text: a tag, then colon-separated
//! fields, terminated by `\n`. [`Message`] is the closed set of lines the
//! protocol knows; [`codec::LineCodec`] turns a byte stream into messages and
//! back.

pub mod codec;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use codec::LineCodec;

/// Attempts a round starts with.
pub const MAX_ATTEMPTS: u32 = 6;
/// Players required before a round can start or continue.
pub const MIN_PLAYERS: usize = 2;
/// Stands in for a letter that has not been revealed yet.
pub const REVEAL_PLACEHOLDER: char = '_';
/// Sent in the word slot of `START`; the real word is only sent with `WIN`/`LOSE`.
pub const WORD_PLACEHOLDER: &str = "?";
/// Longest line (excluding the terminator) the decoder will buffer.
pub const MAX_LINE_LENGTH: usize = 1024;

pub const FIELD_SEPARATOR: char = ':';
pub const LINE_TERMINATOR: u8 = b'\n';

/// Reasons a received line could not be turned into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("unknown message tag {0:?}")]
    UnknownTag(String),
    #[error("{tag} needs {expected} field(s), got {found}")]
    MissingFields {
        tag: MessageTag,
        expected: usize,
        found: usize,
    },
    #[error("invalid {field} in {tag}: {value:?}")]
    InvalidField {
        tag: MessageTag,
        field: &'static str,
        value: String,
    },
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// The tag that starts every protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Join,
    Guess,
    Start,
    Turn,
    Correct,
    Wrong,
    Win,
    Lose,
    Joined,
    Left,
    Error,
    Info,
}

impl MessageTag {
    pub const ALL: [MessageTag; 12] = [
        MessageTag::Join,
        MessageTag::Guess,
        MessageTag::Start,
        MessageTag::Turn,
        MessageTag::Correct,
        MessageTag::Wrong,
        MessageTag::Win,
        MessageTag::Lose,
        MessageTag::Joined,
        MessageTag::Left,
        MessageTag::Error,
        MessageTag::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageTag::Join => "JOIN",
            MessageTag::Guess => "GUESS",
            MessageTag::Start => "START",
            MessageTag::Turn => "TURN",
            MessageTag::Correct => "CORRECT",
            MessageTag::Wrong => "WRONG",
            MessageTag::Win => "WIN",
            MessageTag::Lose => "LOSE",
            MessageTag::Joined => "JOINED",
            MessageTag::Left => "LEFT",
            MessageTag::Error => "ERROR",
            MessageTag::Info => "INFO",
        }
    }

    /// Number of fields that follow the tag on the wire.
    pub fn field_count(self) -> usize {
        match self {
            MessageTag::Start => 4,
            MessageTag::Correct | MessageTag::Wrong | MessageTag::Win | MessageTag::Lose => 2,
            MessageTag::Join
            | MessageTag::Guess
            | MessageTag::Turn
            | MessageTag::Joined
            | MessageTag::Left
            | MessageTag::Error
            | MessageTag::Info => 1,
        }
    }

    /// True for tags a client is allowed to send.
    pub fn is_client_tag(self) -> bool {
        matches!(self, MessageTag::Join | MessageTag::Guess)
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageTag {
    type Err = FramingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| FramingError::UnknownTag(s.to_string()))
    }
}

/// One protocol line.
///
/// Client to server: `Join`, `Guess`. Everything else flows from the server
/// to clients. The guessed letter is kept as raw text so the server can
/// reject bad guesses with an `ERROR` instead of a framing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Join {
        username: String,
    },
    Guess {
        letter: String,
    },
    Start {
        word: String,
        mask: String,
        attempts_left: u32,
        theme: String,
    },
    Turn {
        username: String,
    },
    Correct {
        letter: char,
        mask: String,
    },
    Wrong {
        letter: char,
        attempts_left: u32,
    },
    Win {
        word: String,
        theme: String,
    },
    Lose {
        word: String,
        theme: String,
    },
    Joined {
        username: String,
    },
    Left {
        username: String,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Join { .. } => MessageTag::Join,
            Message::Guess { .. } => MessageTag::Guess,
            Message::Start { .. } => MessageTag::Start,
            Message::Turn { .. } => MessageTag::Turn,
            Message::Correct { .. } => MessageTag::Correct,
            Message::Wrong { .. } => MessageTag::Wrong,
            Message::Win { .. } => MessageTag::Win,
            Message::Lose { .. } => MessageTag::Lose,
            Message::Joined { .. } => MessageTag::Joined,
            Message::Left { .. } => MessageTag::Left,
            Message::Error { .. } => MessageTag::Error,
            Message::Info { .. } => MessageTag::Info,
        }
    }

    /// Field values in wire order.
    pub fn fields(&self) -> Vec<String> {
        match self {
            Message::Join { username }
            | Message::Turn { username }
            | Message::Joined { username }
            | Message::Left { username } => vec![username.clone()],
            Message::Guess { letter } => vec![letter.clone()],
            Message::Start {
                word,
                mask,
                attempts_left,
                theme,
            } => vec![
                word.clone(),
                mask.clone(),
                attempts_left.to_string(),
                theme.clone(),
            ],
            Message::Correct { letter, mask } => vec![letter.to_string(), mask.clone()],
            Message::Wrong {
                letter,
                attempts_left,
            } => vec![letter.to_string(), attempts_left.to_string()],
            Message::Win { word, theme } | Message::Lose { word, theme } => {
                vec![word.clone(), theme.clone()]
            }
            Message::Error { message } | Message::Info { message } => vec![message.clone()],
        }
    }

    /// Renders the message as a single line without the terminator.
    pub fn to_line(&self) -> String {
        encode_line(self.tag(), &self.fields())
    }

    /// Parses one line (terminator already removed).
    ///
    /// The final field of every tag takes the rest of the line, so free text
    /// such as usernames and error messages may contain `:`.
    pub fn parse_line(line: &str) -> Result<Message, FramingError> {
        let (tag, rest) = match line.split_once(FIELD_SEPARATOR) {
            Some((tag, rest)) => (tag.parse::<MessageTag>()?, Some(rest)),
            None => (line.parse::<MessageTag>()?, None),
        };

        let expected = tag.field_count();
        let fields: Vec<&str> = match rest {
            Some(rest) => rest.splitn(expected, FIELD_SEPARATOR).collect(),
            None => Vec::new(),
        };
        if fields.len() < expected {
            return Err(FramingError::MissingFields {
                tag,
                expected,
                found: fields.len(),
            });
        }

        let text = |index: usize| fields[index].to_string();
        let message = match tag {
            MessageTag::Join => Message::Join { username: text(0) },
            MessageTag::Guess => Message::Guess { letter: text(0) },
            MessageTag::Start => Message::Start {
                word: text(0),
                mask: text(1),
                attempts_left: parse_number(tag, "attempts", fields[2])?,
                theme: text(3),
            },
            MessageTag::Turn => Message::Turn { username: text(0) },
            MessageTag::Correct => Message::Correct {
                letter: parse_letter(tag, fields[0])?,
                mask: text(1),
            },
            MessageTag::Wrong => Message::Wrong {
                letter: parse_letter(tag, fields[0])?,
                attempts_left: parse_number(tag, "attempts", fields[1])?,
            },
            MessageTag::Win => Message::Win {
                word: text(0),
                theme: text(1),
            },
            MessageTag::Lose => Message::Lose {
                word: text(0),
                theme: text(1),
            },
            MessageTag::Joined => Message::Joined { username: text(0) },
            MessageTag::Left => Message::Left { username: text(0) },
            MessageTag::Error => Message::Error { message: text(0) },
            MessageTag::Info => Message::Info { message: text(0) },
        };
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Joins a tag and its fields into one line.
///
/// Line breaks inside a field are replaced with spaces so the terminator
/// can only ever appear at the end of the line.
pub fn encode_line<S: AsRef<str>>(tag: MessageTag, fields: &[S]) -> String {
    let mut line = String::from(tag.as_str());
    for field in fields {
        line.push(FIELD_SEPARATOR);
        line.extend(field.as_ref().chars().map(|c| match c {
            '\n' | '\r' => ' ',
            other => other,
        }));
    }
    line
}

fn parse_number(tag: MessageTag, field: &'static str, value: &str) -> Result<u32, FramingError> {
    value.trim().parse().map_err(|_| FramingError::InvalidField {
        tag,
        field,
        value: value.to_string(),
    })
}

fn parse_letter(tag: MessageTag, value: &str) -> Result<char, FramingError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => Ok(letter),
        _ => Err(FramingError::InvalidField {
            tag,
            field: "letter",
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        for tag in MessageTag::ALL {
            assert_eq!(tag.as_str().parse::<MessageTag>(), Ok(tag));
        }
        assert_eq!(
            "HELLO".parse::<MessageTag>(),
            Err(FramingError::UnknownTag("HELLO".to_string()))
        );
        // Tags are case sensitive on the wire
        assert!("join".parse::<MessageTag>().is_err());
    }

    #[test]
    fn test_client_tags() {
        let client_tags: Vec<MessageTag> = MessageTag::ALL
            .into_iter()
            .filter(|tag| tag.is_client_tag())
            .collect();
        assert_eq!(client_tags, vec![MessageTag::Join, MessageTag::Guess]);
    }

    #[test]
    fn test_encode_start_line() {
        let message = Message::Start {
            word: WORD_PLACEHOLDER.to_string(),
            mask: "____".to_string(),
            attempts_left: MAX_ATTEMPTS,
            theme: "animal".to_string(),
        };
        assert_eq!(message.to_line(), "START:?:____:6:animal");
    }

    #[test]
    fn test_encode_replaces_line_breaks() {
        let line = encode_line(MessageTag::Error, &["bad\nthing\r"]);
        assert_eq!(line, "ERROR:bad thing ");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_parse_start() {
        let message = Message::parse_line("START:cat:_ _ _:6:animal").unwrap();
        assert_eq!(
            message,
            Message::Start {
                word: "cat".to_string(),
                mask: "_ _ _".to_string(),
                attempts_left: 6,
                theme: "animal".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_last_field_keeps_separators() {
        let message = Message::parse_line("JOIN:ana:the:great").unwrap();
        assert_eq!(
            message,
            Message::Join {
                username: "ana:the:great".to_string()
            }
        );

        let message = Message::parse_line("ERROR:letter 'a': already used").unwrap();
        assert_eq!(
            message,
            Message::Error {
                message: "letter 'a': already used".to_string()
            }
        );
    }

    #[test]
    fn test_parse_empty_field_is_present() {
        let message = Message::parse_line("JOIN:").unwrap();
        assert_eq!(
            message,
            Message::Join {
                username: String::new()
            }
        );
    }

    #[test]
    fn test_parse_missing_fields() {
        assert_eq!(
            Message::parse_line("JOIN"),
            Err(FramingError::MissingFields {
                tag: MessageTag::Join,
                expected: 1,
                found: 0,
            })
        );
        assert_eq!(
            Message::parse_line("START:?:____:6"),
            Err(FramingError::MissingFields {
                tag: MessageTag::Start,
                expected: 4,
                found: 3,
            })
        );
    }

    #[test]
    fn test_parse_invalid_fields() {
        assert!(matches!(
            Message::parse_line("WRONG:z:five"),
            Err(FramingError::InvalidField {
                field: "attempts",
                ..
            })
        ));
        assert!(matches!(
            Message::parse_line("CORRECT:ab:_a__"),
            Err(FramingError::InvalidField { field: "letter", .. })
        ));
    }

    #[test]
    fn test_parse_unknown_tag() {
        assert_eq!(
            Message::parse_line("HELLO:world"),
            Err(FramingError::UnknownTag("HELLO".to_string()))
        );
    }

    #[test]
    fn test_display_matches_line() {
        let message = Message::Wrong {
            letter: 'z',
            attempts_left: 5,
        };
        assert_eq!(message.to_string(), "WRONG:z:5");
    }
}
