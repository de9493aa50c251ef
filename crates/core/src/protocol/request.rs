use crate::error::{ParseErrorKind, StreamError};
use crate::protocol::Method;

/// A session-control request.
///
/// Wire format, RTSP-style:
///
/// ```text
/// Method SP Resource SP RTSP/1.0 CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// The resource is the video file identifier the client wants streamed.
/// Header lookup is case-insensitive. The same type serves both sides:
/// the server parses it, the client builds and serializes it.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Requested resource (video file identifier).
    pub resource: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Build a request for serialization (client side).
    pub fn new(method: Method, resource: &str) -> Self {
        Self {
            method,
            resource: resource.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Vec::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Parse a request from its text representation.
    ///
    /// Expects a complete request: start line, headers, trailing blank line.
    /// An unknown verb is a parse error — the message is dropped, not
    /// answered.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(StreamError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method: Method = parts[0].parse()?;
        let resource = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(StreamError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(Request {
            method,
            resource,
            version,
            headers,
        })
    }

    /// Serialize to the wire text, terminated by a blank line.
    pub fn serialize(&self) -> String {
        let mut out = format!("{} {} {}\r\n", self.method, self.resource, self.version);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out
    }

    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Request sequence number, used to correlate the reply.
    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.trim().parse().ok())
    }
}
