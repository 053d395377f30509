pub mod errors;
pub mod paths;
pub mod profile;
pub mod render;
pub mod resolve;
pub mod store;

pub use errors::ConfigError;
pub use profile::{decode, encode, Profile, ProxyKind, ProxyRule};
pub use render::render;
pub use resolve::{BundledToolResolver, ToolResolver};
pub use paths::AppPaths;
pub use store::ProfileStore;
