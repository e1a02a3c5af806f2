//! Ensemble membership and session identity.
//!
//! - [`ServerAddress`]: `host:port` of one ensemble member
//! - [`EnsembleView`]: the non-empty, ordered member set
//! - [`Session`]: id, password and negotiated timeout of a session
//! - [`HandshakeResult`]: outcome of establishing or resuming a session

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Port used when an address omits one.
pub const DEFAULT_PORT: u16 = 2181;

/// Identity of one ensemble member.
///
/// # Examples
///
/// ```
/// use zkpool_core::ServerAddress;
///
/// let addr: ServerAddress = "zk1.local".parse().unwrap();
/// assert_eq!(addr.port(), 2181);
/// assert_eq!(addr.to_string(), "zk1.local:2181");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Create an address from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal (without IPv6 brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ParseError::UnterminatedIpv6(s.to_string()))?;
            if host.is_empty() {
                return Err(ParseError::MissingHost(s.to_string()));
            }
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(s, port)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(ParseError::InvalidPort(s.to_string())),
            };
            return Ok(Self::new(host, port));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(s, port)?),
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ParseError::MissingHost(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

fn parse_port(input: &str, port: &str) -> ParseResult<u16> {
    port.parse()
        .map_err(|_| ParseError::InvalidPort(input.to_string()))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Immutable, non-empty, ordered set of ensemble members.
///
/// Duplicates are dropped, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<ServerAddress>", into = "Vec<ServerAddress>")]
pub struct EnsembleView {
    members: Vec<ServerAddress>,
}

impl EnsembleView {
    /// Build a view from members.
    ///
    /// # Errors
    ///
    /// [`ParseError::EmptyEnsemble`] when no member is given.
    pub fn new(members: impl IntoIterator<Item = ServerAddress>) -> ParseResult<Self> {
        let mut unique: Vec<ServerAddress> = Vec::new();
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        if unique.is_empty() {
            return Err(ParseError::EmptyEnsemble);
        }
        Ok(Self { members: unique })
    }

    /// View with a single member.
    pub fn single(member: ServerAddress) -> Self {
        Self {
            members: vec![member],
        }
    }

    /// Members in configuration order.
    pub fn members(&self) -> &[ServerAddress] {
        &self.members
    }

    /// Number of members, at least one.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the view has no members. Never true for a constructed view.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `address` is a member.
    pub fn contains(&self, address: &ServerAddress) -> bool {
        self.members.contains(address)
    }

    /// Iterate the members.
    pub fn iter(&self) -> std::slice::Iter<'_, ServerAddress> {
        self.members.iter()
    }
}

impl FromStr for EnsembleView {
    type Err = ParseError;

    /// Parse `host:port,host:port`. Blank entries are skipped.
    fn from_str(s: &str) -> ParseResult<Self> {
        let members = s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ServerAddress::from_str)
            .collect::<ParseResult<Vec<_>>>()?;
        Self::new(members)
    }
}

impl TryFrom<Vec<ServerAddress>> for EnsembleView {
    type Error = ParseError;

    fn try_from(members: Vec<ServerAddress>) -> ParseResult<Self> {
        Self::new(members)
    }
}

impl From<EnsembleView> for Vec<ServerAddress> {
    fn from(view: EnsembleView) -> Self {
        view.members
    }
}

impl<'a> IntoIterator for &'a EnsembleView {
    type Item = &'a ServerAddress;
    type IntoIter = std::slice::Iter<'a, ServerAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl fmt::Display for EnsembleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{member}")?;
        }
        Ok(())
    }
}

/// A logical, resumable client identity.
///
/// Created wholesale from a successful handshake and replaced, never
/// patched, when lost.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    id: i64,
    password: Vec<u8>,
    timeout: Duration,
}

impl Session {
    /// Id sent when asking for a brand-new session.
    pub const UNINITIALIZED_ID: i64 = 0;

    /// Create a session from handshake results.
    pub fn new(id: i64, password: impl Into<Vec<u8>>, timeout: Duration) -> Self {
        Self {
            id,
            password: password.into(),
            timeout,
        }
    }

    /// The uninitialized sentinel session.
    pub fn uninitialized() -> Self {
        Self {
            id: Self::UNINITIALIZED_ID,
            password: Vec::new(),
            timeout: Duration::ZERO,
        }
    }

    /// Whether this session was assigned by a server.
    pub fn is_initialized(&self) -> bool {
        self.id != Self::UNINITIALIZED_ID
    }

    /// Session id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Opaque session password.
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    /// Negotiated session timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for Session {
    // password stays out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &format_args!("{:#x}", self.id))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.id)
    }
}

/// Outcome of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeResult {
    /// A session was created or resumed.
    Valid(Session),
    /// The server refused to resume the requested session.
    Invalid,
}

impl HandshakeResult {
    /// The session, when valid.
    pub fn session(&self) -> Option<&Session> {
        match self {
            HandshakeResult::Valid(session) => Some(session),
            HandshakeResult::Invalid => None,
        }
    }

    /// Whether the handshake produced a usable session.
    pub fn is_valid(&self) -> bool {
        matches!(self, HandshakeResult::Valid(_))
    }
}
