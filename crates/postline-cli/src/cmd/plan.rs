use crate::cmd::load_config;
use crate::output::{print_json, print_table, report_warnings};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use postline_core::catalog::RotationCatalog;
use postline_core::plan::{ContentPlan, PlannedEntry};
use std::path::Path;

#[derive(Subcommand)]
pub enum PlanSubcommand {
    /// List every planned post
    List,

    /// Show the entry for today, if any
    Today,

    /// Show the first entry after today
    Next,

    /// Check the plan for unknown types, duplicate dates and broken polls
    Validate,
}

pub fn run(root: &Path, subcmd: PlanSubcommand, json: bool) -> anyhow::Result<()> {
    let plan = ContentPlan::load(root).context("failed to load content plan")?;
    match subcmd {
        PlanSubcommand::List => list(&plan, json),
        PlanSubcommand::Today => {
            let today = local_today(root)?;
            show(plan.entry_for_date(today), today, "today", json)
        }
        PlanSubcommand::Next => {
            let today = local_today(root)?;
            show(plan.next_entry_after(today), today, "after today", json)
        }
        PlanSubcommand::Validate => {
            report_warnings("Content plan", &plan.validate(&RotationCatalog::standard()), json)
        }
    }
}

fn local_today(root: &Path) -> anyhow::Result<NaiveDate> {
    let config = load_config(root)?;
    Ok(Utc::now()
        .with_timezone(&config.schedule.offset()?)
        .date_naive())
}

fn list(plan: &ContentPlan, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&plan.entries());
    }
    if plan.is_empty() {
        println!("Content plan is empty.");
        return Ok(());
    }

    let mut entries: Vec<&PlannedEntry> = plan.entries().iter().collect();
    entries.sort_by_key(|e| e.date);
    print_table(
        &["DATE", "TYPE", "TOPIC", "POLL"],
        entries
            .into_iter()
            .map(|e| {
                vec![
                    e.date.to_string(),
                    e.archetype.clone(),
                    e.topic.clone(),
                    if e.poll().is_some() { "yes" } else { "" }.to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn show(entry: Option<&PlannedEntry>, today: NaiveDate, label: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&entry);
    }
    let Some(e) = entry else {
        println!("No content plan entry {label} ({today}).");
        return Ok(());
    };

    let catalog = RotationCatalog::standard();
    let archetype = catalog.resolve_or_default(&e.archetype);
    println!("Date:      {}", e.date);
    println!("Type:      {} ({})", archetype.display_name, archetype.key);
    println!("Topic:     {}", e.topic);
    if !e.keywords.is_empty() {
        println!("Keywords:  {}", e.keywords.join(", "));
    }
    if let Some(structure) = &e.structure {
        println!("Structure: {structure}");
    }
    for fact in e.facts.iter().flatten() {
        println!("Fact:      {fact}");
    }
    if let Some(tags) = &e.tags {
        println!("Tags:      {}", tags.join(" "));
    }
    if let Some(poll) = e.poll() {
        println!("Poll:      {} [{}]", poll.question, poll.options.join(" / "));
    }
    Ok(())
}
