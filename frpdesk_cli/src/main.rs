mod ui;

use clap::Parser;
use crate::ui::cli;
use frpdesk_core::utils::launch_flags::LaunchFlags;
use frpdesk_core::utils::logging::init_logging;

#[tokio::main]
async fn main() {
    init_logging();
    // Launch flags may appear anywhere and in any spelling; pull them out
    // before clap sees the rest.
    let mut raw = std::env::args_os();
    let program = raw.next().unwrap_or_else(|| "frpdesk".into());
    let (flags, rest) = LaunchFlags::extract(raw);
    let args = cli::Args::parse_from(std::iter::once(program).chain(rest));
    if let Err(e) = cli::run_cli(args, flags).await {
        eprintln!("frpdesk: {e}");
        std::process::exit(1);
    }
}
