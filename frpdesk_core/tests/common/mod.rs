// Each integration-test binary compiles this module and uses a different
// subset of it.
#![allow(dead_code)]

pub mod fake_startup;
pub mod recording_runner;
#[cfg(unix)]
pub mod scripts;
