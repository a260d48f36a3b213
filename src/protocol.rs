//! Wire frames exchanged on `/ws`.
//!
//! Control words travel as text frames, file bytes as binary frames.
//! The two are never mixed up: a binary chunk that happens to read `EOF`
//! is still payload.

use axum::extract::ws::Message;
use bytes::Bytes;

pub const FILE_PREFIX:  &str = "FILE:";
pub const FILES_PREFIX: &str = "FILES:";
pub const GET_PREFIX:   &str = "GET:";
pub const ERROR_PREFIX: &str = "ERROR:";
pub const EOF:          &str = "EOF";
pub const CLOSE:        &str = "CLOSE";

/* ---------------- client → server ---------------- */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// `FILE:<name>`, start an upload.
    File(String),
    /// Binary payload for the current upload.
    Chunk(Bytes),
    Eof,
    Close,
    /// `GET:<n>`, 1-based. `None` when `<n>` is not a positive integer.
    Get(Option<usize>),
    /// Ping/pong and text we do not understand.
    Ignored,
    /// Peer sent a close frame.
    Disconnect,
}

impl From<Message> for ClientFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Binary(b) => ClientFrame::Chunk(Bytes::from(b)),
            Message::Text(t)   => parse_text(&t),
            Message::Close(_)  => ClientFrame::Disconnect,
            _                  => ClientFrame::Ignored,
        }
    }
}

pub fn parse_text(t: &str) -> ClientFrame {
    if let Some(name) = t.strip_prefix(FILE_PREFIX) {
        ClientFrame::File(name.to_string())
    } else if let Some(n) = t.strip_prefix(GET_PREFIX) {
        ClientFrame::Get(n.parse::<usize>().ok().filter(|n| *n > 0))
    } else if t == EOF {
        ClientFrame::Eof
    } else if t == CLOSE {
        ClientFrame::Close
    } else {
        ClientFrame::Ignored
    }
}

/* ---------------- server → client ---------------- */
pub fn room_key(key: &str) -> Message { Message::Text(key.to_string()) }

pub fn file_list(names: &[String]) -> Message {
    Message::Text(format!("{FILES_PREFIX}{}", names.join(",")))
}

/// Name, whole buffer, `EOF`. Always sent in this order.
pub fn download(name: &str, data: Bytes) -> [Message; 3] {
    [
        Message::Text(name.to_string()),
        Message::Binary(data.to_vec()),
        Message::Text(EOF.to_string()),
    ]
}

pub fn error(reason: &str) -> Message { Message::Text(format!("{ERROR_PREFIX}{reason}")) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_words() {
        assert_eq!(parse_text("FILE:a.txt"), ClientFrame::File("a.txt".into()));
        assert_eq!(parse_text("EOF"), ClientFrame::Eof);
        assert_eq!(parse_text("CLOSE"), ClientFrame::Close);
        assert_eq!(parse_text("GET:3"), ClientFrame::Get(Some(3)));
        assert_eq!(parse_text("hello"), ClientFrame::Ignored);
    }

    #[test]
    fn bad_get_indices() {
        assert_eq!(parse_text("GET:0"), ClientFrame::Get(None));
        assert_eq!(parse_text("GET:-1"), ClientFrame::Get(None));
        assert_eq!(parse_text("GET:two"), ClientFrame::Get(None));
        assert_eq!(parse_text("GET:"), ClientFrame::Get(None));
    }

    #[test]
    fn binary_is_always_payload() {
        let f = ClientFrame::from(Message::Binary(b"EOF".to_vec()));
        assert_eq!(f, ClientFrame::Chunk(Bytes::from_static(b"EOF")));
    }

    #[test]
    fn empty_list_renders_bare_prefix() {
        assert_eq!(file_list(&[]), Message::Text("FILES:".into()));
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(file_list(&names), Message::Text("FILES:a,b".into()));
    }
}
