//! Host-application launch flags.
//!
//! The autostart entry launches the application as
//! `"<exe>" --silent --autoconnect`. Older entries and hand-written shortcuts
//! use `-silent` or `/silent`, so every spelling is accepted, case-insensitive
//! and in any order. Anything unrecognised is handed back untouched for the
//! subcommand parser.

use std::ffi::OsString;

pub const SILENT_FLAG: &str = "--silent";
pub const AUTOCONNECT_FLAG: &str = "--autoconnect";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    /// Suppress the initial window / banner.
    pub silent: bool,
    /// Load the first profile after a short delay and start it.
    pub autoconnect: bool,
}

impl LaunchFlags {
    /// Split `args` (without the program name) into launch flags and the
    /// remaining arguments, preserving the order of the remainder.
    pub fn extract<I, T>(args: I) -> (Self, Vec<OsString>)
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut flags = Self::default();
        let mut rest = Vec::new();
        for arg in args {
            let arg = arg.into();
            match arg.to_str().and_then(flag_name) {
                Some("silent") => flags.silent = true,
                Some("autoconnect") => flags.autoconnect = true,
                _ => rest.push(arg),
            }
        }
        (flags, rest)
    }
}

fn flag_name(arg: &str) -> Option<&'static str> {
    let bare = arg
        .strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .or_else(|| arg.strip_prefix('/'))?;
    if bare.eq_ignore_ascii_case("silent") {
        Some("silent")
    } else if bare.eq_ignore_ascii_case("autoconnect") {
        Some("autoconnect")
    } else {
        None
    }
}
