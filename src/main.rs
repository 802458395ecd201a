// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use nova_core::{ensure_continuous_thread, EventBus, ProviderResolver, TaskExecutor, ToolSetBuilder};
use nova_model::{MockProvider, ModelProvider};
use nova_node::{router, AppState, StoredToken};
use nova_runtime::{DisabledEmbeddingService, EmbeddingService, HttpEmbeddingService};
use nova_scheduler::{fire_due_task_definition, CronBridge, TaskDefinitionRunner};
use nova_store::checkpoint::InMemoryCheckpointStore;
use nova_store::entities::AgentConfig;
use nova_store::{ConversationStore, InMemoryStore};
use nova_tools::{ConversationGetTool, ConversationSearchTool, ToolRegistry};
use tower_http::limit::RequestBodyLimitLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = nova_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command() {
        Command::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::RegenerateToken => {
            let path = token_path(&config);
            let raw = nova_node::auth::StoredTokenFile::generate_and_save(&path)?;
            println!("new bearer token (printed once, not stored in plaintext):");
            println!("{}", raw.as_str());
            println!("token hash written to {}", path.display());
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn token_path(config: &nova_config::Config) -> std::path::PathBuf {
    config.http.token_file.clone().unwrap_or_else(|| {
        dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join("nova").join("token.yaml")
    })
}

/// Resolves a configured `model.provider` to a concrete client. Only `mock`
/// is linked into this binary — wire clients are external collaborators per
/// `nova-model`'s own scope note; an embedder wanting a real provider adds
/// its crate here and implements `ModelProvider` against it.
struct ConfigProviderResolver {
    mock: Arc<MockProvider>,
}

#[async_trait]
impl ProviderResolver for ConfigProviderResolver {
    async fn resolve(&self, config: &AgentConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
        match config.provider.as_str() {
            "mock" => Ok(self.mock.clone() as Arc<dyn ModelProvider>),
            other => anyhow::bail!(
                "provider '{other}' has no concrete client linked into this binary; \
                 implement ModelProvider for it and wire it into ConfigProviderResolver, \
                 or set the agent's provider to 'mock'"
            ),
        }
    }
}

/// Builds the hybrid-recall built-ins for every agent config. Tool
/// aggregation across sub-agents (§4.6) is the Task Executor's concern, not
/// this builder's; this only assembles the leaf tool set one agent sees.
struct StandardToolSetBuilder {
    store: Arc<dyn ConversationStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

#[async_trait]
impl ToolSetBuilder for StandardToolSetBuilder {
    async fn build(&self, config: &AgentConfig) -> anyhow::Result<Arc<ToolRegistry>> {
        let mut registry = ToolRegistry::new();
        let continuous_thread = ensure_continuous_thread(self.store.as_ref(), config.user).await?.id;
        registry.register(Arc::new(ConversationSearchTool::new(
            self.store.clone(),
            self.embeddings.clone(),
            config.user,
            continuous_thread,
        )));
        registry.register(Arc::new(ConversationGetTool::new(self.store.clone(), config.user)));
        Ok(Arc::new(registry))
    }
}

fn build_embeddings(config: &nova_config::EmbeddingsConfig) -> Arc<dyn EmbeddingService> {
    match &config.url {
        Some(url) => {
            let api_key = config.api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
            Arc::new(HttpEmbeddingService::new(url.clone(), config.model.clone().unwrap_or_default(), api_key, config.dimensions))
        }
        None => Arc::new(DisabledEmbeddingService::new(config.dimensions)),
    }
}

async fn serve(config: nova_config::Config) -> anyhow::Result<()> {
    if config.user_id.is_nil() {
        anyhow::bail!("config.user_id is not set; this deployment needs a single operator user id configured");
    }
    let user = config.user_id;
    let tz: chrono_tz::Tz = config
        .scheduler
        .default_tz
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid scheduler.default_tz: {}", config.scheduler.default_tz))?;

    if config.database.url.is_some() {
        warn!("database.url is configured but this binary was not built with the postgres feature; using the in-memory store");
    }
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
    let checkpoint_links = Arc::new(InMemoryCheckpointStore::new());
    let graph_checkpoints = Arc::new(nova_core::InMemoryGraphCheckpointStore::new());
    let events = Arc::new(EventBus::new());

    let mock_provider = Arc::new(MockProvider);
    let providers = Arc::new(ConfigProviderResolver { mock: mock_provider.clone() });
    let embeddings = build_embeddings(&config.embeddings);
    let tools = Arc::new(StandardToolSetBuilder { store: store.clone(), embeddings });

    let executor = Arc::new(TaskExecutor::new(
        store.clone(),
        checkpoint_links,
        graph_checkpoints,
        providers,
        tools,
        events.clone(),
        tz,
    ));

    ensure_continuous_thread(store.as_ref(), user).await.context("ensuring continuous thread")?;

    let token_file = token_path(&config);
    let token: StoredToken = match nova_node::auth::StoredTokenFile::load(&token_file) {
        Ok(file) => file.token_hash,
        Err(_) => {
            let raw = nova_node::auth::StoredTokenFile::generate_and_save(&token_file)?;
            info!("generated a new bearer token (printed once below), hash saved to {}", token_file.display());
            println!("bearer token: {}", raw.as_str());
            raw.into_stored()
        }
    };

    let summary_provider: Option<Arc<dyn ModelProvider>> =
        if config.model.provider == "mock" { Some(mock_provider.clone() as Arc<dyn ModelProvider>) } else { None };

    let state = Arc::new(AppState {
        store: store.clone(),
        executor: executor.clone(),
        events: events.clone(),
        user,
        tz,
        token,
        summary_provider: summary_provider.clone(),
    });

    let app = router(state).layer(RequestBodyLimitLayer::new(config.http.max_body_bytes));
    let listener = tokio::net::TcpListener::bind(config.http.bind.as_str())
        .await
        .with_context(|| format!("binding {}", config.http.bind))?;
    info!(bind = %config.http.bind, "nova http surface listening");

    let mut runner = TaskDefinitionRunner::new(store.clone(), executor.clone(), tz, events);
    if let Some(p) = summary_provider.clone() {
        runner = runner.with_summary_provider(p);
    }
    let runner = Arc::new(runner);

    tokio::spawn(scheduler_loop(store.clone(), runner, user, tz, summary_provider));

    axum::serve(listener, app).await.context("http server")
}

/// Periodic tick driving cron-triggered task definitions (§4.7) and the
/// once-per-day continuous-context summary sweep (§4.2). Email-poll
/// triggers are not wired here: the mailbox transport is an external
/// collaborator (`nova-scheduler::MailboxPoller`), left to whatever embeds
/// this binary with a concrete IMAP client.
async fn scheduler_loop(
    store: Arc<dyn ConversationStore>,
    runner: Arc<TaskDefinitionRunner>,
    user: uuid::Uuid,
    tz: chrono_tz::Tz,
    summary_provider: Option<Arc<dyn ModelProvider>>,
) {
    let cron_bridge = CronBridge::new();
    let mut last_nightly_run: Option<chrono::NaiveDate> = None;
    let mut ticks = tokio::time::interval(Duration::from_secs(60));

    loop {
        ticks.tick().await;
        let now = chrono::Utc::now();

        match store.list_active_task_definitions(Some(nova_store::entities::TriggerKind::Cron)).await {
            Ok(defs) => {
                for def in &defs {
                    if let Err(e) = cron_bridge.sync(def) {
                        warn!(task_definition = %def.id, error = %e, "failed to sync cron binding");
                    }
                }
                for id in cron_bridge.due(now) {
                    match fire_due_task_definition(store.as_ref(), runner.as_ref(), id).await {
                        Ok(task) => info!(task_definition = %id, task = %task.id, "cron task definition fired"),
                        Err(e) => warn!(task_definition = %id, error = %e, "cron task definition failed"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to list active cron task definitions"),
        }

        let today = now.with_timezone(&tz).date_naive();
        if last_nightly_run != Some(today) {
            if let Some(provider) = summary_provider.clone() {
                if let Ok(thread) = ensure_continuous_thread(store.as_ref(), user).await {
                    match runner.run_nightly_summaries(thread.id, provider).await {
                        Ok(n) => info!(ran = n, "nightly summary sweep complete"),
                        Err(e) => warn!(error = %e, "nightly summary sweep failed"),
                    }
                }
            }
            last_nightly_run = Some(today);
        }
    }
}
