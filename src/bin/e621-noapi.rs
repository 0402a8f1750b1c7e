//! e621-noapi CLI Tool
//!
//! Command-line interface building image/caption datasets from offline
//! e621-style metadata exports.

#[cfg(feature = "cli")]
use e621_noapi::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
