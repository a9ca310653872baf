//! `status` command.

use crate::cli::CommandContext;
use crate::config::BuildPolicy;
use crate::core::AssetRequest;
use crate::middleware::{AssetStatus, BuildCacheMiddleware};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

/// Report whether artifacts are fresh without building anything.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Request paths, e.g. `/js/app.js`.
    #[arg(required = true)]
    paths: Vec<String>,

    /// Print a JSON array instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    path: String,
    status: AssetStatus,
}

impl StatusCommand {
    /// Run the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let middleware = BuildCacheMiddleware::new(BuildPolicy::new(&context.config, None)?);

        let mut entries = Vec::with_capacity(self.paths.len());
        for path in self.paths {
            let status = middleware.inspect(&AssetRequest::get(path.as_str())).await?;
            entries.push(StatusEntry { path, status });
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else if !context.quiet {
            for entry in &entries {
                println!("{} {}", label(entry.status), entry.path);
            }
        }
        Ok(())
    }
}

fn label(status: AssetStatus) -> colored::ColoredString {
    let text = format!("{:<14}", status.to_string());
    match status {
        AssetStatus::Fresh => text.green(),
        AssetStatus::Stale => text.yellow(),
        AssetStatus::MissingSource => text.red(),
        AssetStatus::Ignored => text.dimmed(),
    }
}
