#![warn(missing_docs)]

//! OOBFS core.
//!
//! An in-memory shadow namespace plus the routing layer that services
//! out-of-band filesystem calls from it while delegating everything else to
//! a wrapped backing filesystem.

pub mod attr;
pub mod audit;
pub mod backend;
pub mod classifier;
pub mod direct;
pub mod error;
pub mod router;
pub mod testing;
pub mod tree;

pub use attr::{FileAttr, FileKind};
pub use audit::AuditLog;
pub use backend::{CapabilitySet, DirEntry, FsOp, NullFilesystem, OobFilesystem};
pub use classifier::{ContextId, OobRegistry};
pub use error::{FsError, FsResult};
pub use router::OobRouter;
pub use tree::ShadowTree;
