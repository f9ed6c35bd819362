//! Runners behind the `mrdoc` subcommands. Output goes to stdout; logs go
//! to stderr.

use anyhow::Result;

use crate::pipeline::Services;
use crate::prompts::PromptKind;

/// `mrdoc open`
pub async fn run_open(services: &Services) -> Result<()> {
    let merge_requests = services.gitlab.list_open_merge_requests().await?;
    if merge_requests.is_empty() {
        println!("No open merge requests.");
        return Ok(());
    }

    for mr in merge_requests {
        println!("!{:<6} {}  ({}, {})", mr.iid, mr.title, mr.author, mr.created_at);
    }
    Ok(())
}

/// `mrdoc changes <mr_id>`
pub async fn run_changes(services: &Services, mr_id: u64) -> Result<()> {
    let (prepared, summary) = services.index_merge_request(mr_id).await?;

    println!(
        "Merge request !{}: {} of {} changes retained",
        mr_id,
        prepared.changes.len(),
        prepared.fetched
    );
    for change in &prepared.changes {
        println!("  {}", change.new_path);
    }
    println!("Change log: {}", prepared.change_log_path.display());
    println!(
        "Index: {} ({} chunks, {} embedded)",
        summary.path.display(),
        summary.chunks,
        summary.embedded
    );
    Ok(())
}

/// `mrdoc index-docs`
pub async fn run_index_docs(services: &Services) -> Result<()> {
    let summary = services.index_docs().await?;
    println!(
        "Indexed {} documents ({} chunks, {} embedded) into {}",
        summary.documents,
        summary.chunks,
        summary.embedded,
        summary.path.display()
    );
    Ok(())
}

/// `mrdoc prompt <mr_id>`
pub fn run_prompt(services: &Services, mr_id: u64, kind: PromptKind, custom: Option<&str>) -> Result<()> {
    let prompt = services.render_prompt(mr_id, kind, custom)?;
    println!("{}", prompt);
    Ok(())
}
