pub mod launch_flags;
pub mod logging;
