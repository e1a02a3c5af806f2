//! Validated absolute znode paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, PathResult};

/// An absolute, normalized znode path such as `/app/config`.
///
/// # Examples
///
/// ```
/// use zkpool_core::ZNodePath;
///
/// let path: ZNodePath = "/app/config".parse().unwrap();
/// assert_eq!(path.label(), "config");
/// assert_eq!(path.parent().unwrap().as_str(), "/app");
/// assert_eq!(path.components().collect::<Vec<_>>(), vec!["app", "config"]);
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZNodePath(String);

impl ZNodePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Validate and wrap a path string.
    pub fn new(path: impl Into<String>) -> PathResult<Self> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(PathError::NotAbsolute(path));
        }
        if path.len() == 1 {
            return Ok(Self(path));
        }
        if path.ends_with('/') {
            return Err(PathError::TrailingSlash(path));
        }
        if path.chars().any(char::is_control) {
            return Err(PathError::IllegalCharacter(path));
        }
        for component in path[1..].split('/') {
            match component {
                "" => return Err(PathError::EmptyComponent(path)),
                "." | ".." => return Err(PathError::RelativeComponent(path)),
                _ => {}
            }
        }
        Ok(Self(path))
    }

    /// Path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is `/`.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Last component, or `""` for the root.
    pub fn label(&self) -> &str {
        match self.0.rfind('/') {
            Some(i) => &self.0[i + 1..],
            None => "",
        }
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Self(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Append one child label.
    pub fn join(&self, label: &str) -> PathResult<Self> {
        if label.is_empty() || label.contains('/') {
            return Err(PathError::InvalidLabel(label.to_string()));
        }
        if self.is_root() {
            Self::new(format!("/{label}"))
        } else {
            Self::new(format!("{}/{label}", self.0))
        }
    }

    /// Components from the root down. The root has none.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Whether `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &ZNodePath) -> bool {
        if other.is_root() || self == other {
            return true;
        }
        self.0.starts_with(other.as_str()) && self.0.as_bytes().get(other.0.len()) == Some(&b'/')
    }
}

impl fmt::Debug for ZNodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZNodePath({})", self.0)
    }
}

impl fmt::Display for ZNodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ZNodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ZNodePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ZNodePath> for String {
    fn from(path: ZNodePath) -> Self {
        path.0
    }
}

impl AsRef<str> for ZNodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
