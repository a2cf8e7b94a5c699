//! Minimal STOMP 1.2 text framing, enough for connect/subscribe/receive.

use crate::error::AppError;

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const DISCONNECT: &str = "DISCONNECT";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";
pub const ERROR: &str = "ERROR";

const FRAME_TERMINATOR: char = '\0';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn connect(host: &str) -> Self {
        Self::new(CONNECT)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(SUBSCRIBE)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn disconnect() -> Self {
        Self::new(DISCONNECT)
    }

    /// First occurrence wins when a header is repeated.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn escapes_headers(&self) -> bool {
        self.command != CONNECT && self.command != CONNECTED
    }

    pub fn encode(&self) -> String {
        let escape = self.escapes_headers();
        let mut encoded = String::with_capacity(self.command.len() + self.body.len() + 64);
        encoded.push_str(&self.command);
        encoded.push('\n');
        for (name, value) in &self.headers {
            if escape {
                encoded.push_str(&escape_header(name));
                encoded.push(':');
                encoded.push_str(&escape_header(value));
            } else {
                encoded.push_str(name);
                encoded.push(':');
                encoded.push_str(value);
            }
            encoded.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            encoded.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        encoded.push('\n');
        encoded.push_str(&self.body);
        encoded.push(FRAME_TERMINATOR);
        encoded
    }

    /// Decodes one frame. Returns `Ok(None)` for a heart-beat (EOLs only).
    pub fn decode(raw: &str) -> Result<Option<Self>, AppError> {
        let trimmed = raw.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (command, mut rest) = split_line(trimmed)?;
        if command.is_empty() {
            return Err(AppError::Protocol("frame without command".to_string()));
        }
        let escape = command != CONNECT && command != CONNECTED;

        let mut headers = Vec::new();
        loop {
            let (line, remainder) = split_line(rest)?;
            rest = remainder;
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                AppError::Protocol(format!("malformed header line '{line}'"))
            })?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Self {
            command: command.to_string(),
            headers,
            body: String::new(),
        };

        let body = match frame.header("content-length") {
            Some(length) => {
                let length = length.trim().parse::<usize>().map_err(|error| {
                    AppError::Protocol(format!("invalid content-length: {error}"))
                })?;
                if rest.len() < length {
                    return Err(AppError::Protocol(
                        "frame body shorter than content-length".to_string(),
                    ));
                }
                let body = rest.get(..length).ok_or_else(|| {
                    AppError::Protocol(
                        "content-length ends inside a multi-byte character".to_string(),
                    )
                })?;
                if rest.as_bytes().get(length) != Some(&0) {
                    return Err(AppError::Protocol("unterminated frame".to_string()));
                }
                body
            }
            None => {
                let end = rest
                    .find(FRAME_TERMINATOR)
                    .ok_or_else(|| AppError::Protocol("unterminated frame".to_string()))?;
                &rest[..end]
            }
        };
        frame.body = body.to_string();

        Ok(Some(frame))
    }
}

fn split_line(input: &str) -> Result<(&str, &str), AppError> {
    let newline = input
        .find('\n')
        .ok_or_else(|| AppError::Protocol("truncated frame".to_string()))?;
    let line = input[..newline].trim_end_matches('\r');
    Ok((line, &input[newline + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            ':' => escaped.push_str("\\c"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_header(value: &str) -> Result<String, AppError> {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            unescaped.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('c') => unescaped.push(':'),
            other => {
                return Err(AppError::Protocol(format!(
                    "invalid header escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(unescaped)
}
