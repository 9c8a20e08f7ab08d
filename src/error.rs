//! Error types shared by the library and the `sacco` binary.
//!
//! Internally everything is an `anyhow::Error`. At the command boundary an error is tagged with an
//! `ErrorType` so that callers can tell a bad request apart from a broken database without parsing
//! message strings.

use std::fmt::{Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The public classification of an error returned by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The home directory or `config.json` is missing or invalid.
    Config,
    /// A SQLite operation failed.
    Database,
    /// The request itself was invalid, e.g. an unknown member or a forbidden status change.
    Request,
    /// The calculator rejected its inputs.
    Calculation,
    /// A concurrent write changed the record first.
    Conflict,
    /// Reading or writing a file outside of the database failed.
    Io,
}

impl ErrorType {
    /// The process exit code used by the binary for this kind of error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorType::Request | ErrorType::Calculation => 2,
            ErrorType::Conflict => 3,
            ErrorType::Config => 4,
            ErrorType::Database | ErrorType::Io => 1,
        }
    }
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Config => "configuration error",
            ErrorType::Database => "database error",
            ErrorType::Request => "invalid request",
            ErrorType::Calculation => "calculation error",
            ErrorType::Conflict => "conflicting update",
            ErrorType::Io => "file error",
        };
        f.write_str(s)
    }
}

/// Tags the error side of a result with an `ErrorType`. An error that already carries a tag keeps
/// it, so a lower layer can mark an error more precisely than the command that reports it.
pub trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| {
            let e = e.into();
            if error_type_of(&e).is_some() {
                e
            } else {
                e.context(error_type)
            }
        })
    }
}

/// Finds the `ErrorType` tag in an error's context chain, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    error_type_of(e)
}

fn error_type_of(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}

/// Creates an error tagged with `error_type`.
pub(crate) fn tagged(
    error_type: ErrorType,
    message: impl Display + Send + Sync + 'static,
) -> Error {
    anyhow::anyhow!(message.to_string()).context(error_type)
}
