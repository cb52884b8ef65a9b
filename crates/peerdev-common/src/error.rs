//! Crate-wide error type and the `Context` extension trait used to attach
//! a message to a `Result`/`Option` at the point it crosses a module
//! boundary, in the style of `moltis-common`'s `impl_context!`.

use std::fmt;

/// Coarse error taxonomy shared across every subsystem crate, used by the
/// gateway to pick an HTTP status code / WS `error` frame kind in one
/// place (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A lower transport (store, sandbox process, HTTP client) failed.
    Transport,
    /// Caller-supplied input failed validation.
    Validation,
    /// The requested state transition conflicts with the current state
    /// (e.g. double-accept, already-in-queue).
    Conflict,
    /// A collaborator declined to perform the requested capability
    /// (e.g. sandbox backend unavailable, unsupported language).
    Capability,
    /// Caller is not authorised for the resource (bad/foreign room token).
    Authz,
    /// Operational-transform application failed.
    Ot,
    /// Anything else; a bug or an invariant violation.
    Internal,
}

/// The crate-wide error type. Carries a [`Kind`] for taxonomy mapping, a
/// human-readable message, and an optional underlying cause.
#[derive(Debug)]
pub struct Error {
    pub kind: Kind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: Kind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Kind::Transport, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Kind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Kind::Conflict, message)
    }

    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(Kind::Capability, message)
    }

    pub fn authz(message: impl Into<String>) -> Self {
        Self::new(Kind::Authz, message)
    }

    pub fn ot(message: impl Into<String>) -> Self {
        Self::new(Kind::Ot, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(Kind::Transport, "i/o error", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(Kind::Validation, "malformed json", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lets any error type be lifted into an [`Error`] with an explicit
/// kind, regardless of whether it already carries one of its own.
pub trait FromMessage<T> {
    fn into_error(self, kind: Kind, message: impl Into<String>) -> Error;
}

impl<E: std::error::Error + Send + Sync + 'static> FromMessage<E> for E {
    fn into_error(self, kind: Kind, message: impl Into<String>) -> Error {
        Error::with_source(kind, message, self)
    }
}

/// `.context(...)`/`.with_context(...)` on `Result<T, E>` and
/// `Option<T>`, mirroring `moltis-common::impl_context!`.
pub trait Context<T> {
    fn context(self, kind: Kind, message: impl Into<String>) -> Result<T>;
    fn with_context<F, S>(self, kind: Kind, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, kind: Kind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_source(kind, message, e))
    }

    fn with_context<F, S>(self, kind: Kind, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::with_source(kind, f(), e))
    }
}

impl<T> Context<T> for Option<T> {
    fn context(self, kind: Kind, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| Error::new(kind, message))
    }

    fn with_context<F, S>(self, kind: Kind, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.ok_or_else(|| Error::new(kind, f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_option() {
        let none: Option<u32> = None;
        let err = none.context(Kind::Validation, "missing field").unwrap_err();
        assert_eq!(err.kind, Kind::Validation);
        assert_eq!(err.message(), "missing field");
    }

    #[test]
    fn context_wraps_result_with_source() {
        let parsed: std::result::Result<u32, _> = "nope".parse::<u32>();
        let err = parsed.context(Kind::Validation, "bad port").unwrap_err();
        assert_eq!(err.kind, Kind::Validation);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn display_shows_message_not_source() {
        let err = Error::conflict("already accepted");
        assert_eq!(err.to_string(), "already accepted");
    }
}
