//! Error types for parsing addresses, ensembles and paths.

use thiserror::Error;

/// Errors that can occur parsing a server address or an ensemble string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The ensemble contained no members.
    #[error("ensemble must contain at least one member")]
    EmptyEnsemble,

    /// The address had no host part.
    #[error("missing host in address {0:?}")]
    MissingHost(String),

    /// The port could not be parsed.
    #[error("invalid port in address {0:?}")]
    InvalidPort(String),

    /// An IPv6 literal was missing its closing bracket.
    #[error("unterminated IPv6 literal in address {0:?}")]
    UnterminatedIpv6(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors produced validating a znode path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path did not start with `/`.
    #[error("path must be absolute: {0:?}")]
    NotAbsolute(String),

    /// Path other than the root ended with `/`.
    #[error("path must not end with '/': {0:?}")]
    TrailingSlash(String),

    /// Path contained `//`.
    #[error("empty component in path {0:?}")]
    EmptyComponent(String),

    /// Path contained a `.` or `..` component.
    #[error("relative component in path {0:?}")]
    RelativeComponent(String),

    /// Path contained a NUL or other control character.
    #[error("illegal character in path {0:?}")]
    IllegalCharacter(String),

    /// A child label was empty or contained `/`.
    #[error("invalid label {0:?}")]
    InvalidLabel(String),
}

/// Result type for path operations.
pub type PathResult<T> = Result<T, PathError>;
