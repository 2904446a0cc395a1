use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use postline_core::cadence;
use postline_core::catalog::RotationCatalog;
use postline_core::store::{read_state, YamlStateStore};
use serde::Serialize;
use std::path::Path;

#[derive(Subcommand)]
pub enum RotationSubcommand {
    /// Show the next archetypes and their decorations without changing state
    Preview {
        /// How many upcoming publications to show
        #[arg(long, short = 'n', default_value_t = 4)]
        count: usize,
    },

    /// List every archetype the content plan may name
    List,
}

pub fn run(root: &Path, subcmd: RotationSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RotationSubcommand::Preview { count } => preview(root, count, json),
        RotationSubcommand::List => list(json),
    }
}

#[derive(Serialize)]
struct PreviewRow {
    publication: usize,
    archetype: &'static str,
    display_name: &'static str,
    call_to_action: bool,
    personal_experience: bool,
}

fn preview(root: &Path, count: usize, json: bool) -> anyhow::Result<()> {
    let catalog = RotationCatalog::standard();
    let mut state = read_state(&YamlStateStore::new(root), &catalog)
        .context("failed to read rotation state")?;

    // Advance a scratch copy; the stored state is never written.
    let now = Utc::now();
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        let published = state.publication_count();
        let next = state.next_archetype(&catalog);
        rows.push(PreviewRow {
            publication: published + 1,
            archetype: next.key,
            display_name: next.display_name,
            call_to_action: cadence::should_add_cta(published),
            personal_experience: cadence::should_add_personal_experience(published),
        });
        state.mark_published(&catalog, next.key, now);
    }

    if json {
        return print_json(&rows);
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
    print_table(
        &["#", "ARCHETYPE", "KEY", "CTA", "PERSONAL"],
        rows.iter()
            .map(|r| {
                vec![
                    r.publication.to_string(),
                    r.display_name.to_string(),
                    r.archetype.to_string(),
                    yes_no(r.call_to_action),
                    yes_no(r.personal_experience),
                ]
            })
            .collect(),
    );
    println!("\nContent-plan days replace the archetype but still take their slot.");
    Ok(())
}

fn list(json: bool) -> anyhow::Result<()> {
    let catalog = RotationCatalog::standard();
    if json {
        return print_json(&catalog.archetypes());
    }

    let in_rotation = |key: &str| catalog.sequence().iter().any(|k| *k == key);
    print_table(
        &["KEY", "NAME", "ROTATION", "DESCRIPTION"],
        catalog
            .archetypes()
            .iter()
            .map(|a| {
                vec![
                    a.key.to_string(),
                    a.display_name.to_string(),
                    if in_rotation(a.key) { "yes" } else { "plan only" }.to_string(),
                    a.description.to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}
