//! assetmill CLI entry point
//!
//! Parses arguments, runs the command and renders failures with suggestions:
//! - `build` - build artifacts for request paths
//! - `status` - show whether artifacts are fresh
//! - `warm` - build every matching source file

use anyhow::Result;
use assetmill::cli;
use assetmill::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
