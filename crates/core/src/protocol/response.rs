use crate::error::{ParseErrorKind, StreamError};

/// A session-control response.
///
/// Serializes to the text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Session: 123456\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern — chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
/// The client side parses the same format via [`parse`](Self::parse).
#[must_use]
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Response {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Response {
            status_code,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK — the verb was accepted.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 404 Not Found — SETUP named a missing video source.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 500 Internal Server Error — generic server-side failure.
    pub fn server_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the wire text. `Content-Length` is appended
    /// automatically when a body is present.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }

    /// Parse a response from its text representation (client side).
    ///
    /// Everything after the blank line is taken as the body; the transport
    /// layer is responsible for having read `Content-Length` bytes of it.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let (head, body) = match raw.split_once("\r\n\r\n") {
            Some((head, body)) => (head, body),
            None => (raw, ""),
        };

        let mut lines = head.lines();
        let status_line = lines.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let mut parts = status_line.splitn(3, ' ');
        let _version = parts.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        })?;
        let status_code: u16 = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or(StreamError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            })?;
        let status_text = parts.next().unwrap_or("").to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon_pos = line.find(':').ok_or(StreamError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            headers.push((
                line[..colon_pos].trim().to_string(),
                line[colon_pos + 1..].trim().to_string(),
            ));
        }

        Ok(Response {
            status_code,
            status_text,
            headers,
            body: if body.is_empty() {
                None
            } else {
                Some(body.to_string())
            },
        })
    }

    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The sequence number of the request this reply answers.
    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Session identifier, when the reply carries one.
    ///
    /// Tolerates a parameter suffix: `123456;timeout=60` → `123456`.
    pub fn session_id(&self) -> Option<u32> {
        self.header("Session")
            .and_then(|v| v.split(';').next())
            .and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = Response::ok().add_header("CSeq", "1").add_header("Session", "42");
        let s = resp.serialize();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Session: 42\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn serialize_with_body() {
        let resp = Response::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n".to_string());
        let s = resp.serialize();
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("v=0\r\n"));
    }

    #[test]
    fn not_found_response() {
        let resp = Response::not_found().add_header("CSeq", "5");
        assert_eq!(resp.status_code, 404);
        assert!(resp.serialize().starts_with("RTSP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn parse_plain_reply() {
        let resp =
            Response::parse("RTSP/1.0 200 OK\r\nCSeq: 7\r\nSession: 314159\r\n\r\n").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.cseq(), Some(7));
        assert_eq!(resp.session_id(), Some(314159));
        assert!(resp.body.is_none());
    }

    #[test]
    fn parse_reply_with_body() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Type: application/sdp\r\n\r\nv=0\r\n";
        let resp = Response::parse(raw).unwrap();
        assert_eq!(resp.header("Content-Type"), Some("application/sdp"));
        assert_eq!(resp.body.as_deref(), Some("v=0\r\n"));
    }

    #[test]
    fn parse_error_status() {
        let resp = Response::parse("RTSP/1.0 404 Not Found\r\nCSeq: 3\r\n\r\n").unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.status_text, "Not Found");
    }

    #[test]
    fn parse_garbage_is_error() {
        assert!(Response::parse("").is_err());
        assert!(Response::parse("not a status line").is_err());
    }

    #[test]
    fn session_id_with_suffix() {
        let resp = Response::parse("RTSP/1.0 200 OK\r\nSession: 42;timeout=60\r\n\r\n").unwrap();
        assert_eq!(resp.session_id(), Some(42));
    }

    #[test]
    fn builder_roundtrips_through_parse() {
        let text = Response::ok()
            .add_header("CSeq", "9")
            .add_header("Session", "100")
            .serialize();
        let parsed = Response::parse(&text).unwrap();
        assert_eq!(parsed.status_code, 200);
        assert_eq!(parsed.cseq(), Some(9));
        assert_eq!(parsed.session_id(), Some(100));
    }
}
