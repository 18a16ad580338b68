use core::fmt::{self, Display, Formatter};

use crate::status::Status;

/// A single-line reply to the inbound peer, e.g. `250 2.0.0 Ok`.
///
/// The text never contains CR or LF; anything handed to [`ReplyLine::new`] is
/// flattened so that one reply always occupies exactly one protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    code: u16,
    text: String,
}

impl ReplyLine {
    #[must_use]
    pub fn new(code: impl Into<u16>, text: impl AsRef<str>) -> Self {
        let text = text
            .as_ref()
            .split(['\r', '\n'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            code: code.into(),
            text,
        }
    }

    /// Build a reply from backend-supplied bytes, which may not be UTF-8
    #[must_use]
    pub fn from_bytes(code: u16, text: &[u8]) -> Self {
        Self::new(code, String::from_utf8_lossy(text))
    }

    #[inline]
    pub const fn code(&self) -> u16 {
        self.code
    }

    #[inline]
    pub fn status(&self) -> Status {
        Status::from(self.code)
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for ReplyLine {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(fmt, "{}", self.code)
        } else {
            write!(fmt, "{} {}", self.code, self.text)
        }
    }
}
