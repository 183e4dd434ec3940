//! Message protocol definitions
//!
//! Every message travels as one line of the form `type:size:source:data`.
//! Decoding is fail-soft: missing or garbled fields get fallbacks instead of
//! an error, so a malformed line never tears down a connection.

use crate::error::AppError;

/// Bound on the `source` field, terminator included
pub const MAX_NAME: usize = 50;
/// Bound on the `data` field, terminator included
pub const MAX_DATA: usize = 1024;
/// Longest accepted wire line
pub const MAX_LINE: usize = 2048;

/// Stands in for line breaks inside a QUERY_ACK listing
pub const LINE_BREAK_SUBSTITUTE: char = '~';
/// Source used when a decoded line carries none
pub const FALLBACK_SOURCE: &str = "client";
/// Source stamped on server-generated listings
pub const SERVER_SOURCE: &str = "SERVER";

/// Numeric message tags
///
/// Requests flow client → server; the `*Ack`/`*Nak` tags flow
/// server → client. Logout, leave and quit are acknowledged with their own
/// tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Login,
    LoginAck,
    LoginNak,
    Logout,
    Join,
    JoinAck,
    JoinNak,
    LeaveSession,
    NewSession,
    NewSessionAck,
    Chat,
    Query,
    QueryAck,
    Quit,
    /// Any tag outside the protocol table (0 for undecodable lines)
    Unknown(u32),
}

impl MessageType {
    /// Wire code for this tag
    pub fn code(self) -> u32 {
        match self {
            MessageType::Login => 1,
            MessageType::LoginAck => 2,
            MessageType::LoginNak => 3,
            MessageType::Logout => 4,
            MessageType::Join => 5,
            MessageType::JoinAck => 6,
            MessageType::JoinNak => 7,
            MessageType::LeaveSession => 8,
            MessageType::NewSession => 9,
            MessageType::NewSessionAck => 10,
            MessageType::Chat => 11,
            MessageType::Query => 12,
            MessageType::QueryAck => 13,
            MessageType::Quit => 14,
            MessageType::Unknown(code) => code,
        }
    }
}

impl From<u32> for MessageType {
    fn from(code: u32) -> Self {
        match code {
            1 => MessageType::Login,
            2 => MessageType::LoginAck,
            3 => MessageType::LoginNak,
            4 => MessageType::Logout,
            5 => MessageType::Join,
            6 => MessageType::JoinAck,
            7 => MessageType::JoinNak,
            8 => MessageType::LeaveSession,
            9 => MessageType::NewSession,
            10 => MessageType::NewSessionAck,
            11 => MessageType::Chat,
            12 => MessageType::Query,
            13 => MessageType::QueryAck,
            14 => MessageType::Quit,
            other => MessageType::Unknown(other),
        }
    }
}

/// One protocol message
///
/// `size` is whatever the sender declared. It is carried along but never
/// checked against `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub size: u32,
    pub source: String,
    pub data: String,
}

impl Message {
    pub fn new(
        kind: MessageType,
        size: u32,
        source: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            size,
            source: source.into(),
            data: data.into(),
        }
    }

    /// Client request: `size` is the payload length
    pub fn request(kind: MessageType, source: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
        Self::new(kind, size, source, data)
    }

    /// Server acknowledgement: no source, zero size
    pub fn ack(kind: MessageType, data: impl Into<String>) -> Self {
        Self::new(kind, 0, "", data)
    }

    /// Serialize into a single terminated wire line
    ///
    /// `source` and `data` are cut to their bounds, and `data` is cut at its
    /// first line terminator.
    pub fn encode(&self) -> String {
        let data = self
            .data
            .split(['\n', '\r'])
            .next()
            .unwrap_or_default();
        format!(
            "{}:{}:{}:{}\n",
            self.kind.code(),
            self.size,
            truncate(&self.source, MAX_NAME - 1),
            truncate(data, MAX_DATA - 1)
        )
    }

    /// Parse one wire line (with or without its terminator)
    ///
    /// Unparsable integers read as 0, a missing source becomes
    /// [`FALLBACK_SOURCE`] and missing data repeats the source.
    pub fn decode(line: &str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields = line.splitn(4, ':');

        let kind = MessageType::from(fields.next().map(parse_leading_u32).unwrap_or(0));
        let size = fields.next().map(parse_leading_u32).unwrap_or(0);
        let source = fields
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| truncate(s, MAX_NAME - 1))
            .unwrap_or(FALLBACK_SOURCE)
            .to_string();
        let data = match fields.next().filter(|s| !s.is_empty()) {
            Some(data) => truncate(data, MAX_DATA - 1).to_string(),
            None => source.clone(),
        };

        Self {
            kind,
            size,
            source,
            data,
        }
    }
}

/// Convert AppError to a negative acknowledgement for the requester
impl From<AppError> for Message {
    fn from(err: AppError) -> Self {
        Message::ack(err.nak_kind(), err.reason())
    }
}

/// Replace line breaks so a multi-line text fits in one `data` field
pub fn flatten_lines(text: &str) -> String {
    text.replace('\n', &LINE_BREAK_SUBSTITUTE.to_string())
}

/// Undo [`flatten_lines`] for display
pub fn restore_lines(text: &str) -> String {
    text.replace(LINE_BREAK_SUBSTITUTE, "\n")
}

/// Cut `s` to at most `max` bytes on a char boundary
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// atoi-style: leading digits only, anything else reads as 0
fn parse_leading_u32(field: &str) -> u32 {
    let field = field.trim_start();
    let digits = field
        .find(|c: char| !c.is_ascii_digit())
        .map_or(field, |end| &field[..end]);
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let msg = Message::new(MessageType::Chat, 2, "b", "hi");
        assert_eq!(msg.encode(), "11:2:b:hi\n");
    }

    #[test]
    fn test_encode_ack_has_empty_source() {
        let msg = Message::ack(MessageType::JoinAck, "lobby");
        assert_eq!(msg.encode(), "6:0::lobby\n");
    }

    #[test]
    fn test_encode_truncates_fields() {
        let long = "x".repeat(MAX_DATA * 2);
        let msg = Message::new(MessageType::Chat, 0, "y".repeat(80), long);
        let line = msg.encode();
        let decoded = Message::decode(&line);
        assert_eq!(decoded.source.len(), MAX_NAME - 1);
        assert_eq!(decoded.data.len(), MAX_DATA - 1);
    }

    #[test]
    fn test_encode_never_emits_inner_line_break() {
        let msg = Message::new(MessageType::Chat, 0, "a", "one\ntwo");
        assert_eq!(msg.encode(), "11:0:a:one\n");
    }

    #[test]
    fn test_decode_data_keeps_colons() {
        let msg = Message::decode("11:9:a:time 12:30\n");
        assert_eq!(msg.kind, MessageType::Chat);
        assert_eq!(msg.size, 9);
        assert_eq!(msg.source, "a");
        assert_eq!(msg.data, "time 12:30");
    }

    #[test]
    fn test_decode_missing_source_uses_sentinel() {
        let msg = Message::decode("2:0::");
        assert_eq!(msg.kind, MessageType::LoginAck);
        assert_eq!(msg.source, FALLBACK_SOURCE);
        assert_eq!(msg.data, FALLBACK_SOURCE);
    }

    #[test]
    fn test_decode_missing_data_repeats_source() {
        let msg = Message::decode("4:0:a");
        assert_eq!(msg.kind, MessageType::Logout);
        assert_eq!(msg.source, "a");
        assert_eq!(msg.data, "a");
    }

    #[test]
    fn test_decode_ack_with_empty_source() {
        let msg = Message::decode("3:0::Invalid credentials");
        assert_eq!(msg.kind, MessageType::LoginNak);
        assert_eq!(msg.data, "Invalid credentials");
    }

    #[test]
    fn test_decode_garbage() {
        let blank = Message::decode("");
        assert_eq!(blank.kind, MessageType::Unknown(0));
        assert_eq!(blank.size, 0);

        let junk = Message::decode("hello there");
        assert_eq!(junk.kind, MessageType::Unknown(0));
        assert_eq!(junk.source, FALLBACK_SOURCE);

        let prefix = Message::decode("12abc:7x:a:b");
        assert_eq!(prefix.kind, MessageType::Query);
        assert_eq!(prefix.size, 7);
    }

    #[test]
    fn test_decode_accepts_crlf() {
        let msg = Message::decode("5:5:a:lobby\r\n");
        assert_eq!(msg.kind, MessageType::Join);
        assert_eq!(msg.data, "lobby");
    }

    #[test]
    fn test_type_codes() {
        for code in 1..=14 {
            assert_eq!(MessageType::from(code).code(), code);
        }
        assert_eq!(MessageType::from(42), MessageType::Unknown(42));
    }

    #[test]
    fn test_request_size_is_payload_length() {
        let msg = Message::request(MessageType::Login, "a", "secret");
        assert_eq!(msg.size, 6);
        assert_eq!(Message::request(MessageType::Logout, "a", "").size, 0);
    }

    #[test]
    fn test_nak_from_error() {
        let msg: Message = AppError::SessionExists("lobby".into()).into();
        assert_eq!(msg.kind, MessageType::JoinNak);
        assert_eq!(msg.data, "Session already exists");
    }

    #[test]
    fn test_line_break_substitution() {
        assert_eq!(flatten_lines("a\nb\n"), "a~b~");
        assert_eq!(restore_lines("a~b~"), "a\nb\n");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
