use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Select, Text};

use crate::engine::RetrievalEngine;
use crate::inference::join_context;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Query,
    Index,
    Status,
    Quit,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Interactive front-end: query the index, rebuild it, or show what changed.
pub async fn terminal(engine: &RetrievalEngine) -> Result<()> {
    loop {
        let mode = Select::new(
            "Select operation:",
            vec![Mode::Query, Mode::Index, Mode::Status, Mode::Quit],
        )
        .prompt()?;

        match mode {
            Mode::Query => {
                let prompt = Text::new("Enter your query:").prompt()?;
                let docs = engine.query(&prompt, None).await?;
                if docs.is_empty() {
                    println!("(no matching documents)");
                } else {
                    println!("{}", join_context(&docs));
                }
            }
            Mode::Index => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(ProgressStyle::with_template("{prefix} {spinner} {wide_msg}")?);
                pb.set_prefix("[index]");
                pb.set_message(format!("Rebuilding from {}...", engine.corpus_dir().display()));
                pb.enable_steady_tick(Duration::from_millis(100));

                match engine.rebuild_now().await {
                    Ok(report) => pb.finish_with_message(format!(
                        "Done! generation {}: {} documents ({} new, {} updated, {} deleted, {} skipped)",
                        report.generation,
                        report.documents,
                        report.new,
                        report.updated,
                        report.deleted,
                        report.skipped.len()
                    )),
                    Err(e) => {
                        pb.abandon_with_message("Failed");
                        return Err(e).context("rebuild failed");
                    }
                }
            }
            Mode::Status => {
                let overview = engine.corpus_overview().await?;
                let status = &overview.status;
                let last = engine
                    .last_rebuild()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("last rebuild: {last}");
                println!("documents:    {}", engine.document_count());
                println!("new:          {:?}", status.new);
                println!("updated:      {:?}", status.updated);
                println!("deleted:      {:?}", status.deleted);
                println!("files:        {}", overview.files.len());
                for file in &overview.files {
                    let modified = file
                        .modified_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("  {:<40} {:>10} B  {modified}", file.id, file.size);
                }
            }
            Mode::Quit => break,
        }
    }

    Ok(())
}
