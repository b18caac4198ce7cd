use core::fmt;
use std::sync::Arc;

use treequery_dtm::DtmError;

/// Namespace URI of the W3C-defined XPath/XQuery error codes (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// Error codes emitted by the engine. `TQ*` codes are project specific and cover
/// failures of the tree model layer and of sequence cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    XPST0003, // malformed expression tree
    XPST0008, // unbound variable
    XPST0017, // unknown function or wrong arity
    XPST0051, // unknown or non-atomic cast target
    XPTY0004, // type error (cardinality of a cast operand, operand types)
    XPTY0019, // intermediate path step yields non-nodes
    XPTY0020, // axis step on a non-node context item
    XPDY0002, // context item undefined
    XPDY0050, // treat as: dynamic type mismatch
    FOAR0001, // division by zero
    FOCA0002, // invalid lexical value (NaN/INF to integer)
    FORG0001, // invalid value for cast
    FORG0006, // invalid argument type (effective boolean value)
    FOER0000, // unidentified error
    TQDM0001, // tree model configuration
    TQDM0002, // invalid node handle
    TQSQ0001, // unsupported sequence operation
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0051 => "XPST0051",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::TQDM0001 => "TQDM0001",
            ErrorCode::TQDM0002 => "TQDM0002",
            ErrorCode::TQSQ0001 => "TQSQ0001",
        }
    }

    /// W3C codes live in [`ERR_NS`]; project codes have no namespace.
    pub fn is_w3c(self) -> bool {
        !matches!(self, ErrorCode::TQDM0001 | ErrorCode::TQDM0002 | ErrorCode::TQSQ0001)
    }

    pub fn from_code(s: &str) -> Option<Self> {
        use ErrorCode::*;
        let local = s.strip_prefix("err:").unwrap_or(s);
        [
            XPST0003, XPST0008, XPST0017, XPST0051, XPTY0004, XPTY0019, XPTY0020, XPDY0002, XPDY0050, FOAR0001,
            FOCA0002, FORG0001, FORG0006, FOER0000, TQDM0001, TQDM0002, TQSQ0001,
        ]
        .into_iter()
        .find(|c| c.as_str() == local)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_w3c() {
            write!(f, "err:{}", self.as_str())
        } else {
            f.write_str(self.as_str())
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), source: None }
    }

    /// Compose an error with a source cause.
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn format_code(&self) -> String {
        self.code.to_string()
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::TQSQ0001, msg)
    }

    pub fn unbound_variable(name: impl fmt::Display) -> Self {
        Self::from_code(ErrorCode::XPST0008, format!("variable ${name} is not bound"))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPST0003, msg)
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPTY0004, msg)
    }

    pub fn is_unsupported(&self) -> bool {
        self.code == ErrorCode::TQSQ0001
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())
    }
}

impl From<DtmError> for Error {
    fn from(e: DtmError) -> Self {
        let code = match &e {
            DtmError::Configuration(_) => ErrorCode::TQDM0001,
            DtmError::InvalidHandle(_) => ErrorCode::TQDM0002,
            DtmError::UnsupportedOperation(_) => ErrorCode::TQSQ0001,
            DtmError::MalformedEvents(_) => ErrorCode::FOER0000,
        };
        Error::from_code(code, e.to_string()).with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}
