//! Newline-delimited JSON framing for commands and events

use crate::protocol::command::{Command, CommandRecord};
use crate::protocol::event::{Event, EventRecord};
use bytes::Bytes;
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::io;
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

/// Tags accepted in `input.kind`
pub const COMMAND_KINDS: &[&str] = &["SMTPLogin", "SMTPLogout", "SimpleSMTPEmail", "StreamKeepAlive"];

/// Default upper bound for a single inbound record
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Errors raised while reading inbound records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not a valid record
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// The envelope is valid but its `kind` is unknown
    #[error("Unrecognized command: {0}")]
    UnrecognizedCommand(String),

    /// A line grew past the framing limit without a terminator
    #[error("Record exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The underlying request body failed
    #[error("Inbound stream failed: {0}")]
    Stream(String),
}

impl DecodeError {
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        DecodeError::Malformed(msg.into())
    }

    /// Fatal errors corrupt the framing itself and end the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::LineTooLong { .. } | DecodeError::Stream(_))
    }
}

/// Decode a single inbound line
pub fn decode_command(line: &[u8]) -> Result<Command, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(|e| DecodeError::malformed(e.to_string()))?;

    let kind = value
        .get("input")
        .and_then(|input| input.get("kind"))
        .and_then(|kind| kind.as_str())
        .ok_or_else(|| DecodeError::malformed("missing input.kind"))?;

    if !COMMAND_KINDS.contains(&kind) {
        return Err(DecodeError::UnrecognizedCommand(kind.to_string()));
    }

    let record: CommandRecord =
        serde_json::from_value(value).map_err(|e| DecodeError::malformed(e.to_string()))?;
    Ok(record.input)
}

/// Encode a command as one line, terminator included
pub fn encode_command(command: &Command) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&CommandRecord {
        input: command.clone(),
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Encode an event as one line, terminator included
pub fn encode_event(event: &Event) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&EventRecord {
        server_message: event.clone(),
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Decode a single outbound line
pub fn decode_event(line: &[u8]) -> Result<Event, DecodeError> {
    let record: EventRecord =
        serde_json::from_slice(line).map_err(|e| DecodeError::malformed(e.to_string()))?;
    Ok(record.server_message)
}

/// Turn a request body into a stream of decoded commands.
///
/// Per-record failures are yielded in place and decoding carries on with the
/// next line. A fatal error is yielded once and then the stream ends. Lines
/// may end in `\n` or `\r\n`; blank lines are skipped and a final line
/// without a terminator is still decoded.
pub fn decode_commands<S, B, E>(
    body: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<Command, DecodeError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Into<Bytes> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let body = Box::pin(body.map(|chunk| {
        chunk
            .map(Into::<Bytes>::into)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }));

    FramedRead::new(StreamReader::new(body), LinesCodec::new_with_max_length(max_line_bytes))
        .filter(|line| future::ready(!matches!(line, Ok(line) if line.trim().is_empty())))
        .map(move |line| match line {
            Ok(line) => decode_command(line.as_bytes()),
            Err(LinesCodecError::MaxLineLengthExceeded) => Err(DecodeError::LineTooLong {
                limit: max_line_bytes,
            }),
            Err(LinesCodecError::Io(e)) => Err(DecodeError::Stream(e.to_string())),
        })
        .scan(false, |ended, item| {
            if *ended {
                return future::ready(None);
            }
            *ended = matches!(&item, Err(e) if e.is_fatal());
            future::ready(Some(item))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{EmailAddress, SimpleEmail};
    use crate::protocol::event::{ConnectionKind, ErrorCode};
    use crate::session::SessionId;
    use futures::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, Infallible>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[test]
    fn test_decode_login() {
        let command =
            decode_command(br#"{"input":{"kind":"SMTPLogin","username":"a","password":"b"}}"#).unwrap();
        assert_eq!(command, Command::login("a", "b"));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = decode_command(br#"{"input":{"kind":"IMAPSelect"}}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnrecognizedCommand("IMAPSelect".to_string()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_decode_known_kind_missing_fields() {
        let err = decode_command(br#"{"input":{"kind":"SMTPLogin","username":"a"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_envelope() {
        let err = decode_command(br#"{"kind":"SMTPLogout"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_commands_round_trip() {
        let commands = vec![
            Command::login("user@example.com", "secret"),
            Command::Logout,
            Command::keep_alive(true),
            Command::keep_alive(false),
            Command::SendEmail(SimpleEmail {
                sender: EmailAddress::named("Alice", "alice@example.com"),
                recipients: vec![EmailAddress::new("bob@example.com")],
                cc_recipients: vec![EmailAddress::named("Carol", "carol@example.com")],
                bcc_recipients: vec![],
                subject: "Quarterly report".to_string(),
                text_body: "See attached.".to_string(),
                html_body: Some("<p>See attached.</p>".to_string()),
            }),
        ];

        for command in commands {
            let line = encode_command(&command).unwrap();
            assert_eq!(line.last(), Some(&b'\n'));
            assert_eq!(decode_command(&line[..line.len() - 1]).unwrap(), command);
        }
    }

    #[test]
    fn test_events_round_trip() {
        let id = SessionId::new();
        let events = vec![
            Event::state_changed(id, ConnectionKind::Open),
            Event::state_changed(id, ConnectionKind::InUse),
            Event::ConnectionClosed,
            Event::heartbeat(),
            Event::Error {
                id: Some(id),
                code: ErrorCode::SendFailed,
                message: "relay denied".to_string(),
            },
            Event::Error {
                id: None,
                code: ErrorCode::DecodeError,
                message: "bad".to_string(),
            },
        ];

        for event in events {
            let line = encode_event(&event).unwrap();
            assert_eq!(decode_event(&line).unwrap(), event);
        }
    }

    #[tokio::test]
    async fn test_overlong_line_ends_stream() {
        let body = chunks(&[
            "{\"input\":{\"kind\":\"StreamKeepAlive\",",
            "\"keepAlive\":true}}\n{\"input\":{\"kind\":\"SMTPLogout\"}}\n",
        ]);
        let decoded: Vec<_> = decode_commands(body, 16).collect().await;

        assert_eq!(decoded, vec![Err(DecodeError::LineTooLong { limit: 16 })]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_fatal() {
        let body = stream::iter(vec![Ok::<_, Infallible>(vec![0xff, 0xfe, b'\n'])]);
        let decoded: Vec<_> = decode_commands(body, DEFAULT_MAX_LINE_BYTES).collect().await;

        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(DecodeError::Stream(_))));
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_poison_stream() {
        let body = chunks(&[
            "{not json}\n{\"input\":{\"kind\":\"Stream",
            "KeepAlive\",\"keepAlive\":true}}\r\n\n",
            "{\"input\":{\"kind\":\"SMTPLogout\"}}",
        ]);
        let decoded: Vec<_> = decode_commands(body, DEFAULT_MAX_LINE_BYTES).collect().await;

        assert_eq!(decoded.len(), 3);
        assert!(matches!(decoded[0], Err(DecodeError::Malformed(_))));
        assert_eq!(decoded[1], Ok(Command::keep_alive(true)));
        assert_eq!(decoded[2], Ok(Command::Logout));
    }

    #[tokio::test]
    async fn test_body_error_is_fatal() {
        let body = stream::iter(vec![
            Ok(b"{\"input\":{\"kind\":\"SMTPLogout\"}}\n".to_vec()),
            Err("connection reset"),
            Ok(b"{\"input\":{\"kind\":\"SMTPLogout\"}}\n".to_vec()),
        ]);
        let decoded: Vec<_> = decode_commands(body, DEFAULT_MAX_LINE_BYTES).collect().await;

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Ok(Command::Logout));
        assert_eq!(decoded[1], Err(DecodeError::Stream("connection reset".to_string())));
    }
}
