//! Control-channel messages: the five session verbs, request/response text,
//! and the DESCRIBE session description body.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::SessionHandler;
pub use request::Request;
pub use response::Response;

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseErrorKind, StreamError};

/// The five modeled session verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Setup,
    Play,
    Pause,
    Teardown,
    Describe,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::Describe => "DESCRIBE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETUP" => Ok(Self::Setup),
            "PLAY" => Ok(Self::Play),
            "PAUSE" => Ok(Self::Pause),
            "TEARDOWN" => Ok(Self::Teardown),
            "DESCRIBE" => Ok(Self::Describe),
            other => Err(StreamError::Parse {
                kind: ParseErrorKind::UnknownMethod(other.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_roundtrip() {
        for m in [
            Method::Setup,
            Method::Play,
            Method::Pause,
            Method::Teardown,
            Method::Describe,
        ] {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
        }
    }

    #[test]
    fn unknown_method_rejected() {
        assert!("OPTIONS".parse::<Method>().is_err());
    }
}
