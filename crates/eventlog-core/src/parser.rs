//! `Parse(raw, format) -> Message | error`.

use bytes::Bytes;

use crate::{error::ParseError, message::Message};

/// Outcome of decoding one raw inbound payload.
///
/// A message that decodes but carries an empty `event_id` is kept as
/// `Garbage` rather than discarded, so callers can file the
/// partially-decoded record for diagnostics.
pub enum ParseOutcome {
    /// Decoded successfully, `event_id` present.
    Parsed(Message),
    /// Decoded but missing `event_id`; retained for the Garbage bucket.
    Garbage(Message, ParseError),
    /// Could not be decoded at all (empty input, bad format, bad json).
    Rejected(ParseError),
}

/// Decode a raw inbound payload into a typed [`Message`].
///
/// `format == "json"` decodes the record; any other value fails with
/// [`ParseError::UnsupportedFormat`]. Empty input fails with
/// [`ParseError::Empty`].
#[must_use]
pub fn parse(raw: &[u8], format: &str) -> ParseOutcome {
    if raw.is_empty() {
        return ParseOutcome::Rejected(ParseError::Empty);
    }
    if format != "json" {
        return ParseOutcome::Rejected(ParseError::UnsupportedFormat);
    }

    let mut message: Message = match serde_json::from_slice(raw) {
        Ok(message) => message,
        Err(e) => return ParseOutcome::Rejected(ParseError::Json(e)),
    };
    message.content_raw = Bytes::copy_from_slice(raw);

    if message.event_id.is_empty() {
        return ParseOutcome::Garbage(message, ParseError::MissingEventId);
    }
    ParseOutcome::Parsed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            parse(b"", "json"),
            ParseOutcome::Rejected(ParseError::Empty)
        ));
    }

    #[test]
    fn rejects_unsupported_format() {
        assert!(matches!(
            parse(b"{}", "yaml"),
            ParseOutcome::Rejected(ParseError::UnsupportedFormat)
        ));
    }

    #[test]
    fn parses_valid_event() {
        let raw = br#"{"event_id":"E1","message":"hi"}"#;
        match parse(raw, "json") {
            ParseOutcome::Parsed(message) => {
                assert_eq!(message.event_id, "E1");
                assert_eq!(message.message_text, "hi");
                assert_eq!(&message.content_raw[..], &raw[..]);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn files_missing_event_id_as_garbage() {
        match parse(b"{}", "json") {
            ParseOutcome::Garbage(message, ParseError::MissingEventId) => {
                assert!(message.event_id.is_empty());
            }
            _ => panic!("expected Garbage(MissingEventId)"),
        }
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            parse(b"not json", "json"),
            ParseOutcome::Rejected(ParseError::Json(_))
        ));
    }
}
