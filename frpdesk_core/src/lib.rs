pub mod core;
pub mod startup;
pub mod storage;
pub mod utils;

// re‑export ergonomic entry points
pub use crate::core::session::TunnelSession;
pub use crate::core::errors::{ProcessError, SessionError};
pub use crate::core::supervisor::{ProcessEvent, ProcessState, ProcessSupervisor};
pub use startup::controller::{ModeChange, StartupMode, StartupModeController};
pub use storage::paths::AppPaths;
pub use storage::profile::{Profile, ProxyKind, ProxyRule};
pub use storage::store::ProfileStore;
