use anyhow::Context;
use postline_core::{
    config::Config,
    io, paths,
    state::RotationState,
    store::{StateStore, YamlStateStore},
};
use std::path::Path;

/// Starter content plan: an empty list plus a commented example entry.
const PLAN_TEMPLATE: &str = "\
# Operator content plan. An entry whose date matches today replaces the
# rotation's choice for that day.
#
# posts:
#   - date: 2026-03-03
#     type: checklist          # useful | case | interactive | checklist |
#                              # tools | mistake | lifehack | expert_opinion
#     topic: \"Spring sale preparation\"
#     keywords: [spring, sale]
#     structure: \"7 items, one line each\"
#     facts: [\"Traffic grows 30% in March\"]
#     tags: [sale, checklist]
#     include_poll: false
#     poll_question: \"Are you ready?\"
#     poll_options: [\"Yes\", \"Not yet\"]
posts: []
";

pub fn run(root: &Path, channel: Option<&str>) -> anyhow::Result<()> {
    let channel = channel.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "channel".to_string())
    });

    println!("Initializing postline in: {}", root.display());

    let dir = paths::postline_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 1. config.yaml
    if !paths::config_path(root).exists() {
        Config::new(&channel)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    // 2. rotation.yaml
    let store = YamlStateStore::new(root);
    if !store.path().exists() {
        store
            .save(&RotationState::new())
            .context("failed to write rotation.yaml")?;
        println!("  created: {}", paths::ROTATION_FILE);
    } else {
        println!("  exists:  {}", paths::ROTATION_FILE);
    }

    // 3. content_plan.yaml
    let created = io::write_if_missing(&paths::plan_path(root), PLAN_TEMPLATE.as_bytes())
        .context("failed to write content_plan.yaml")?;
    let verb = if created { "created:" } else { "exists: " };
    println!("  {verb} {}", paths::PLAN_FILE);

    println!("\nNext: set telegram.channel_id in {}", paths::CONFIG_FILE);
    println!("and export TELEGRAM_BOT_TOKEN, EXA_API_KEY and ANTHROPIC_API_KEY.");
    Ok(())
}
