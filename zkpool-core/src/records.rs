//! Protocol record shapes.
//!
//! These are the abstract request and response records exchanged with an
//! ensemble member. No byte encoding is defined here; every record derives
//! serde traits so a transport can pick its own codec.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Session, ZNodePath};

/// Transaction id assigned by the ensemble.
pub type Zxid = i64;

/// Client-assigned request id.
pub type Xid = i32;

/// Kind of a protocol operation, with its numeric wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum OpCode {
    /// Create a node.
    Create = 1,
    /// Delete a node.
    Delete = 2,
    /// Check existence and read stat.
    Exists = 3,
    /// Read data.
    GetData = 4,
    /// Write data.
    SetData = 5,
    /// Read the ACL.
    GetAcl = 6,
    /// Write the ACL.
    SetAcl = 7,
    /// List children.
    GetChildren = 8,
    /// Flush the leader channel.
    Sync = 9,
    /// List children with the parent stat.
    GetChildren2 = 12,
    /// Version check inside a multi.
    Check = 13,
    /// Atomic batch.
    Multi = 14,
    /// Create a node returning its stat.
    Create2 = 15,
    /// Close the session.
    CloseSession = -11,
}

/// Server-side error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// Generic server failure.
    SystemError = -1,
    /// State inconsistency detected by the server.
    RuntimeInconsistency = -2,
    /// Data inconsistency detected by the server.
    DataInconsistency = -3,
    /// Connection to the server was lost.
    ConnectionLoss = -4,
    /// Marshalling failure.
    MarshallingError = -5,
    /// Operation not implemented.
    Unimplemented = -6,
    /// Operation timed out.
    OperationTimeout = -7,
    /// Invalid arguments.
    BadArguments = -8,
    /// Generic API error.
    ApiError = -100,
    /// Node does not exist.
    NoNode = -101,
    /// Not authenticated.
    NoAuth = -102,
    /// Version conflict.
    BadVersion = -103,
    /// Ephemeral nodes may not have children.
    NoChildrenForEphemerals = -108,
    /// Node already exists.
    NodeExists = -110,
    /// Node has children.
    NotEmpty = -111,
    /// Session expired.
    SessionExpired = -112,
    /// Invalid callback.
    InvalidCallback = -113,
    /// Invalid ACL.
    InvalidAcl = -114,
    /// Authentication failed.
    AuthFailed = -115,
    /// Session moved to another server.
    SessionMoved = -118,
    /// Server is read-only.
    NotReadOnly = -119,
    /// A sibling operation in the same multi failed first.
    RuntimeRollback = -2000,
}

impl ErrorCode {
    /// Numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a code by number.
    pub fn from_code(code: i32) -> Option<Self> {
        use ErrorCode::*;
        let known = [
            SystemError,
            RuntimeInconsistency,
            DataInconsistency,
            ConnectionLoss,
            MarshallingError,
            Unimplemented,
            OperationTimeout,
            BadArguments,
            ApiError,
            NoNode,
            NoAuth,
            BadVersion,
            NoChildrenForEphemerals,
            NodeExists,
            NotEmpty,
            SessionExpired,
            InvalidCallback,
            InvalidAcl,
            AuthFailed,
            SessionMoved,
            NotReadOnly,
            RuntimeRollback,
        ];
        known.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Node metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction that created the node.
    pub czxid: Zxid,
    /// Last transaction that modified the node data.
    pub mzxid: Zxid,
    /// Creation time, milliseconds since the epoch.
    pub ctime: i64,
    /// Modification time, milliseconds since the epoch.
    pub mtime: i64,
    /// Data version.
    pub version: i32,
    /// Children version.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owning session of an ephemeral node, or 0.
    pub ephemeral_owner: i64,
    /// Length of the data.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
    /// Last transaction that modified the children.
    pub pzxid: Zxid,
}

/// Permission bits for [`Acl::perms`].
pub mod perms {
    /// Read data and list children.
    pub const READ: u32 = 1;
    /// Write data.
    pub const WRITE: u32 = 1 << 1;
    /// Create children.
    pub const CREATE: u32 = 1 << 2;
    /// Delete children.
    pub const DELETE: u32 = 1 << 3;
    /// Change the ACL.
    pub const ADMIN: u32 = 1 << 4;
    /// Every permission.
    pub const ALL: u32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// Authentication identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Scheme such as `world`, `digest` or `ip`.
    pub scheme: String,
    /// Scheme-specific identity.
    pub id: String,
}

impl Id {
    /// Create an identity.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// `world:anyone`.
    pub fn anyone() -> Self {
        Self::new("world", "anyone")
    }
}

/// One access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Bitmask of [`perms`].
    pub perms: u32,
    /// Identity the permissions apply to.
    pub id: Id,
}

impl Acl {
    /// Create an entry.
    pub fn new(perms: u32, id: Id) -> Self {
        Self { perms, id }
    }

    /// Everything allowed to anyone.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::ALL, Id::anyone())]
    }

    /// Read-only for anyone.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl::new(perms::READ, Id::anyone())]
    }
}

/// How a node is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum CreateMode {
    /// Survives the session.
    #[default]
    Persistent = 0,
    /// Deleted when the session ends.
    Ephemeral = 1,
    /// Persistent, with a monotonically increasing suffix.
    PersistentSequential = 2,
    /// Ephemeral, with a monotonically increasing suffix.
    EphemeralSequential = 3,
    /// Deleted by the server once its last child is gone.
    Container = 4,
}

impl CreateMode {
    /// Whether the node is tied to the session.
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Whether the server appends a sequence suffix.
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Kind of change a watch fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchedEventType {
    /// Node was created.
    NodeCreated,
    /// Node was deleted.
    NodeDeleted,
    /// Node data changed.
    NodeDataChanged,
    /// Node children changed.
    NodeChildrenChanged,
}

/// Out-of-band watch notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchEvent {
    /// What changed.
    pub event_type: WatchedEventType,
    /// Node the watch was set on.
    pub path: ZNodePath,
}

/// Application request records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Create a node.
    Create {
        /// Requested path; sequential modes append a suffix.
        path: ZNodePath,
        /// Initial data.
        data: Vec<u8>,
        /// Initial ACL.
        acl: Vec<Acl>,
        /// Node lifetime.
        mode: CreateMode,
    },
    /// Create a node and return its stat.
    Create2 {
        /// Requested path; sequential modes append a suffix.
        path: ZNodePath,
        /// Initial data.
        data: Vec<u8>,
        /// Initial ACL.
        acl: Vec<Acl>,
        /// Node lifetime.
        mode: CreateMode,
    },
    /// Delete a node.
    Delete {
        /// Target node.
        path: ZNodePath,
        /// Expected data version, -1 for any.
        version: i32,
    },
    /// Read a node's stat.
    Exists {
        /// Target node.
        path: ZNodePath,
        /// Leave a watch.
        watch: bool,
    },
    /// Read a node's data and stat.
    GetData {
        /// Target node.
        path: ZNodePath,
        /// Leave a watch.
        watch: bool,
    },
    /// Replace a node's data.
    SetData {
        /// Target node.
        path: ZNodePath,
        /// New data.
        data: Vec<u8>,
        /// Expected data version, -1 for any.
        version: i32,
    },
    /// Read a node's ACL.
    GetAcl {
        /// Target node.
        path: ZNodePath,
    },
    /// Replace a node's ACL.
    SetAcl {
        /// Target node.
        path: ZNodePath,
        /// New ACL.
        acl: Vec<Acl>,
        /// Expected ACL version, -1 for any.
        version: i32,
    },
    /// List a node's children.
    GetChildren {
        /// Target node.
        path: ZNodePath,
        /// Leave a watch.
        watch: bool,
    },
    /// List a node's children and read its stat.
    GetChildren2 {
        /// Target node.
        path: ZNodePath,
        /// Leave a watch.
        watch: bool,
    },
    /// Assert a node version inside a multi.
    Check {
        /// Target node.
        path: ZNodePath,
        /// Expected data version.
        version: i32,
    },
    /// Wait until the connected member caught up with the leader.
    Sync {
        /// Path the sync is issued against.
        path: ZNodePath,
    },
    /// Atomic batch.
    Multi(Vec<Request>),
    /// Close the session.
    Disconnect,
}

impl Request {
    /// Kind of this request.
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Create { .. } => OpCode::Create,
            Request::Create2 { .. } => OpCode::Create2,
            Request::Delete { .. } => OpCode::Delete,
            Request::Exists { .. } => OpCode::Exists,
            Request::GetData { .. } => OpCode::GetData,
            Request::SetData { .. } => OpCode::SetData,
            Request::GetAcl { .. } => OpCode::GetAcl,
            Request::SetAcl { .. } => OpCode::SetAcl,
            Request::GetChildren { .. } => OpCode::GetChildren,
            Request::GetChildren2 { .. } => OpCode::GetChildren2,
            Request::Check { .. } => OpCode::Check,
            Request::Sync { .. } => OpCode::Sync,
            Request::Multi(_) => OpCode::Multi,
            Request::Disconnect => OpCode::CloseSession,
        }
    }

    /// Target path, for single-node requests.
    pub fn path(&self) -> Option<&ZNodePath> {
        match self {
            Request::Create { path, .. }
            | Request::Create2 { path, .. }
            | Request::Delete { path, .. }
            | Request::Exists { path, .. }
            | Request::GetData { path, .. }
            | Request::SetData { path, .. }
            | Request::GetAcl { path }
            | Request::SetAcl { path, .. }
            | Request::GetChildren { path, .. }
            | Request::GetChildren2 { path, .. }
            | Request::Check { path, .. }
            | Request::Sync { path } => Some(path),
            Request::Multi(_) | Request::Disconnect => None,
        }
    }
}

/// Application response records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Node created at `path`.
    Create {
        /// Actual path, including any sequence suffix.
        path: ZNodePath,
    },
    /// Node created, with its stat.
    Create2 {
        /// Actual path, including any sequence suffix.
        path: ZNodePath,
        /// Stat of the new node.
        stat: Stat,
    },
    /// Node deleted.
    Delete,
    /// Node exists.
    Exists {
        /// Node stat.
        stat: Stat,
    },
    /// Node data.
    GetData {
        /// Data bytes.
        data: Vec<u8>,
        /// Node stat.
        stat: Stat,
    },
    /// Data replaced.
    SetData {
        /// Stat after the write.
        stat: Stat,
    },
    /// Node ACL.
    GetAcl {
        /// ACL entries.
        acl: Vec<Acl>,
        /// Node stat.
        stat: Stat,
    },
    /// ACL replaced.
    SetAcl {
        /// Stat after the write.
        stat: Stat,
    },
    /// Child labels.
    GetChildren {
        /// Labels, not full paths.
        children: Vec<String>,
    },
    /// Child labels and parent stat.
    GetChildren2 {
        /// Labels, not full paths.
        children: Vec<String>,
        /// Parent stat.
        stat: Stat,
    },
    /// Version check passed.
    Check,
    /// Sync completed.
    Sync {
        /// Path the sync was issued against.
        path: ZNodePath,
    },
    /// Per-operation results of a multi, in request order.
    Multi(Vec<Response>),
    /// Session closed.
    Disconnect,
    /// The operation failed on the server.
    Error(ErrorCode),
}

impl Response {
    /// Error code, if this is an error result.
    pub fn error(&self) -> Option<ErrorCode> {
        match self {
            Response::Error(code) => Some(*code),
            _ => None,
        }
    }

    /// Stat carried by this response, if any.
    pub fn stat(&self) -> Option<&Stat> {
        match self {
            Response::Create2 { stat, .. }
            | Response::Exists { stat }
            | Response::GetData { stat, .. }
            | Response::SetData { stat }
            | Response::GetAcl { stat, .. }
            | Response::SetAcl { stat }
            | Response::GetChildren2 { stat, .. } => Some(stat),
            _ => None,
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Id of the request this answers.
    pub xid: Xid,
    /// Zxid at which the server processed the request.
    pub zxid: Zxid,
    /// The response record.
    pub record: Response,
}

impl Reply {
    /// Create a reply.
    pub fn new(xid: Xid, zxid: Zxid, record: Response) -> Self {
        Self { xid, zxid, record }
    }
}

/// Session handshake request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Protocol version, always 0.
    pub protocol_version: i32,
    /// Highest zxid this client has observed.
    pub last_zxid_seen: Zxid,
    /// Requested session timeout.
    pub timeout: Duration,
    /// Session to resume, or [`Session::UNINITIALIZED_ID`].
    pub session_id: i64,
    /// Password of the session to resume.
    pub password: Vec<u8>,
    /// Accept a read-only member.
    pub read_only: bool,
}

impl ConnectRequest {
    /// Ask for a brand-new session.
    pub fn new_session(timeout: Duration, last_zxid_seen: Zxid) -> Self {
        Self {
            protocol_version: 0,
            last_zxid_seen,
            timeout,
            session_id: Session::UNINITIALIZED_ID,
            password: Vec::new(),
            read_only: false,
        }
    }

    /// Ask to resume `session`.
    pub fn resume(session: &Session, last_zxid_seen: Zxid) -> Self {
        Self {
            protocol_version: 0,
            last_zxid_seen,
            timeout: session.timeout(),
            session_id: session.id(),
            password: session.password().to_vec(),
            read_only: false,
        }
    }

    /// Whether this asks for a new session rather than a resumption.
    pub fn is_new_session(&self) -> bool {
        self.session_id == Session::UNINITIALIZED_ID
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("session_id", &format_args!("{:#x}", self.session_id))
            .field("last_zxid_seen", &self.last_zxid_seen)
            .field("timeout", &self.timeout)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}
