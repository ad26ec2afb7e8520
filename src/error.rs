use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    UnexpectedEof,
    Protocol(String),
    Decode(String),
    InvalidCmap,
    InvalidBfchar,
    InvalidBfrange,
    MissingCatalog,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "read from byte source failed: {}", err),
            Error::UnexpectedEof => write!(f, "unexpected end of input"),
            Error::Protocol(msg) => write!(f, "malformed PDF syntax: {}", msg),
            Error::Decode(msg) => write!(f, "stream decode failed: {}", msg),
            Error::InvalidCmap => write!(f, "malformed cmap stream"),
            Error::InvalidBfchar => write!(f, "malformed bfchar block"),
            Error::InvalidBfrange => write!(f, "malformed bfrange block"),
            Error::MissingCatalog => write!(f, "trailer root does not resolve to a catalog"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::Protocol("stream keyword without end-of-line".to_string());
        assert_eq!(
            err.to_string(),
            "malformed PDF syntax: stream keyword without end-of-line"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::from(io);
        assert!(err.source().is_some());
    }
}
