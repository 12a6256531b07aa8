//! Record repository: persisted per-item JSON records in a git working copy.
//!
//! - **io**: byte-level record IO
//! - **retry**: write retry policy
//! - **commit**: serialized version-control commits
//! - **repository**: load, verified store, whole-tree snapshots

pub mod commit;
pub mod io;
pub mod repository;
pub mod retry;

pub use commit::{commit_message, CommitQueue, Committer, GitCommitter};
pub use io::{DiskIo, RecordIo};
pub use repository::{RepositoryStore, WriteOutcome};
pub use retry::RetryPolicy;
