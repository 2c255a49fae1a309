//! STOMP 1.2 frame codec.
//!
//! One WebSocket text message carries one frame. A message made only of
//! end-of-line octets is a heart-beat.

use crate::error::FrameError;
use std::fmt;
use std::time::Duration;

/// STOMP commands used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Server handshake reply.
    Connected,
    /// Client publish.
    Send,
    /// Client subscription request.
    Subscribe,
    /// Client subscription removal.
    Unsubscribe,
    /// Client graceful close.
    Disconnect,
    /// Server delivery on a subscription.
    Message,
    /// Server acknowledgment of a `receipt` header.
    Receipt,
    /// Server-side failure.
    Error,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Result<Self, FrameError> {
        Ok(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }

    // CONNECT and CONNECTED headers are sent verbatim.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first wins.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

/// A decoded inbound WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Bare end-of-line keepalive.
    HeartBeat,
    /// A full frame.
    Frame(Frame),
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up the first header with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the frame for the wire.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes a WebSocket text message.
    pub fn decode(text: &str) -> Result<Incoming, FrameError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(Incoming::HeartBeat);
        }

        let (head, rest) = split_head(text).ok_or(FrameError::MissingTerminator)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command = match lines.next() {
            Some(line) if !line.is_empty() => Command::parse(line)?,
            _ => return Err(FrameError::Empty),
        };

        let escape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.get("content-length") {
            Some(raw) => {
                let len: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
                if len > rest.len() || !rest.is_char_boundary(len) {
                    return Err(FrameError::InvalidContentLength(raw.to_string()));
                }
                if !rest[len..].starts_with('\0') {
                    return Err(FrameError::MissingTerminator);
                }
                &rest[..len]
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::MissingTerminator)?;
                &rest[..end]
            }
        };

        Ok(Incoming::Frame(Frame {
            body: body.to_string(),
            ..frame
        }))
    }
}

/// Splits a frame into its header block and everything after the blank line.
fn split_head(text: &str) -> Option<(&str, &str)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let (at, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            // A frame without headers: "COMMAND\n\n" is caught above,
            // "COMMAND\n\0" has only one newline before the body.
            let i = text.find('\n')?;
            return Some((&text[..i], &text[i + 1..]));
        }
    };
    Some((&text[..at], &text[at + sep..]))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

/// Heart-beat intervals, as carried by the `heart-beat` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Smallest interval at which the sender will emit heart-beats.
    pub outgoing: Duration,
    /// Desired interval at which the sender wants to receive heart-beats.
    pub incoming: Duration,
}

impl HeartBeat {
    /// Creates heart-beat settings.
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Parses `"<outgoing>,<incoming>"` in milliseconds.
    pub fn parse(header: &str) -> Result<Self, FrameError> {
        let invalid = || FrameError::InvalidHeartBeat(header.to_string());
        let (out, inc) = header.split_once(',').ok_or_else(invalid)?;
        let out: u64 = out.trim().parse().map_err(|_| invalid())?;
        let inc: u64 = inc.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(
            Duration::from_millis(out),
            Duration::from_millis(inc),
        ))
    }

    /// Header value.
    pub fn to_header(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Negotiates with the server's CONNECTED heart-beat.
    ///
    /// Returns `(send_every, expect_within)`; `None` disables that side.
    pub fn negotiate(&self, server: &HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() {
                None
            } else {
                Some(ours.max(theirs))
            }
        };
        (
            pick(self.outgoing, server.incoming),
            pick(self.incoming, server.outgoing),
        )
    }
}

/// The end-of-line keepalive sent on the wire.
pub const HEARTBEAT: &str = "\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_send_frame() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/chat.send")
            .header("content-type", "application/json")
            .body(r#"{"conversationId":"1","content":"hi"}"#);

        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.send\ncontent-type:application/json\n\n{\"conversationId\":\"1\",\"content\":\"hi\"}\0"
        );
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        let frame = Frame::new(Command::Connect).header("Authorization", "Bearer a:b");
        assert_eq!(frame.encode(), "CONNECT\nAuthorization:Bearer a:b\n\n\0");
    }

    #[test]
    fn test_decode_message_frame() {
        let raw = "MESSAGE\ndestination:/user/queue/messages\nsubscription:sub-1\nmessage-id:7\n\n{\"id\":1}\0";
        let Incoming::Frame(frame) = Frame::decode(raw).unwrap() else {
            panic!("expected frame");
        };

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-1"));
        assert_eq!(frame.get("destination"), Some("/user/queue/messages"));
        assert_eq!(frame.body, "{\"id\":1}");
    }

    #[test]
    fn test_decode_crlf_and_escapes() {
        let raw = "MESSAGE\r\nnote:a\\cb\\nc\r\n\r\nbody\0\n";
        let Incoming::Frame(frame) = Frame::decode(raw).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.get("note"), Some("a:b\nc"));
        assert_eq!(frame.body, "body");
    }

    #[test]
    fn test_decode_connected_without_body() {
        let raw = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0";
        let Incoming::Frame(frame) = Frame::decode(raw).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_decode_content_length_allows_nul_in_body() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let Incoming::Frame(frame) = Frame::decode(raw).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_decode_heartbeats() {
        assert_eq!(Frame::decode("\n").unwrap(), Incoming::HeartBeat);
        assert_eq!(Frame::decode("\r\n\n").unwrap(), Incoming::HeartBeat);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Frame::decode("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".to_string()))
        );
        assert_eq!(
            Frame::decode("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader("nocolon".to_string()))
        );
        assert_eq!(
            Frame::decode("MESSAGE\na:b\n\nbody"),
            Err(FrameError::MissingTerminator)
        );
        assert!(matches!(
            Frame::decode("MESSAGE\nx:\\t\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\ncontent-length:99\n\nab\0"),
            Err(FrameError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_heartbeat_negotiation() {
        let client = HeartBeat::parse("10000,10000").unwrap();

        let server = HeartBeat::parse("0,0").unwrap();
        assert_eq!(client.negotiate(&server), (None, None));

        let server = HeartBeat::parse("20000, 5000").unwrap();
        assert_eq!(
            client.negotiate(&server),
            (
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(20))
            )
        );

        assert_eq!(client.to_header(), "10000,10000");
        assert!(HeartBeat::parse("10000").is_err());
    }
}
