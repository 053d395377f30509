pub mod errors;
pub mod session;
pub mod supervisor;

// Re-export the modules here for easy import elsewhere.
pub use errors::*;
pub use session::*;
pub use supervisor::*;
