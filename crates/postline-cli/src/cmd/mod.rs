pub mod config;
pub mod init;
pub mod plan;
pub mod publish;
pub mod rotation;
pub mod run;
pub mod schedule_now;
pub mod status;

use anyhow::Context;
use postline_channels::{
    AnthropicGenerator, ChannelError, CompositeCollector, ExaCollector, HabrCollector,
    OperatorNotifier, PollPublished, Published, Publisher, TelegramPublisher,
};
use postline_core::catalog::RotationCatalog;
use postline_core::config::{Config, WarnLevel};
use postline_core::guard::PublishGuard;
use postline_core::paths;
use postline_core::store::YamlStateStore;
use postline_engine::control::{self, ControlReply, ControlRequest};
use postline_engine::{
    Clock, Collaborators, ControlError, Pipeline, PipelineSettings, PlanSource, StateExecutor,
    SystemClock,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load .postline/config.yaml")
}

/// Refuse to start pipeline work on a config with errors.
pub(crate) fn ensure_valid(config: &Config) -> anyhow::Result<()> {
    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }
    Ok(())
}

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

/// Send `request` to the scheduler daemon serving `root`.
/// `Ok(None)` means no daemon is listening.
pub(crate) fn daemon_request(
    rt: &tokio::runtime::Runtime,
    root: &Path,
    request: &ControlRequest,
) -> anyhow::Result<Option<ControlReply>> {
    let socket = paths::control_path(root);
    if !socket.exists() {
        return Ok(None);
    }
    match rt.block_on(control::request(&socket, request)) {
        Ok(reply) => Ok(Some(reply)),
        Err(ControlError::Unavailable(e)) => {
            tracing::debug!(error = %e, "scheduler control socket not answering");
            Ok(None)
        }
        Err(e) => Err(e).context("scheduler control request failed"),
    }
}

/// Stand-in publisher for dry runs, where no channel credentials are needed.
struct DisabledPublisher;

#[async_trait::async_trait]
impl Publisher for DisabledPublisher {
    async fn publish(&self, _text: &str) -> Result<Published, ChannelError> {
        Err(ChannelError::Config("publishing is disabled for dry runs".to_string()))
    }

    async fn publish_with_poll(
        &self,
        _text: &str,
        _question: &str,
        _options: &[String],
    ) -> Result<PollPublished, ChannelError> {
        Err(ChannelError::Config("publishing is disabled for dry runs".to_string()))
    }
}

/// Wire the production pipeline from config and environment secrets.
pub(crate) fn build_pipeline(root: &Path, config: &Config, dry_run: bool) -> anyhow::Result<Pipeline> {
    let catalog = RotationCatalog::standard();
    let executor = StateExecutor::new(Box::new(YamlStateStore::new(root)), catalog)
        .context("failed to start state executor")?;

    let mut collector = CompositeCollector::new()
        .with("exa", ExaCollector::from_config(&config.exa).context("exa collector")?);
    if config.habr.enabled {
        collector = collector.with("habr", HabrCollector::from_config(&config.habr));
    }
    let generator = AnthropicGenerator::from_config(&config.anthropic).context("anthropic generator")?;

    let (publisher, notifier): (Arc<dyn Publisher>, Option<Arc<dyn OperatorNotifier>>) = if dry_run {
        (Arc::new(DisabledPublisher) as Arc<dyn Publisher>, None)
    } else {
        let telegram = Arc::new(
            TelegramPublisher::from_config(&config.telegram).context("telegram publisher")?,
        );
        let notifier = config
            .telegram
            .admin_chat_id
            .is_some()
            .then(|| telegram.clone() as Arc<dyn OperatorNotifier>);
        (telegram as Arc<dyn Publisher>, notifier)
    };

    let settings = PipelineSettings {
        guard: PublishGuard::from_hours(config.guard.min_interval_hours),
        timeout: Duration::from_secs(config.pipeline.timeout_secs),
        offset: config.schedule.offset()?,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    Ok(Pipeline::new(
        executor,
        Collaborators {
            collector: Arc::new(collector),
            generator: Arc::new(generator),
            publisher,
            notifier,
        },
        settings,
        PlanSource::File(root.to_path_buf()),
        clock,
    ))
}
