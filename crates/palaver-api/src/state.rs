//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! The engine is generic over repository traits; AppState pins it to the
//! SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use palaver_core::chat::accumulator::StreamingAccumulator;
use palaver_core::chat::engine::{ChatEngine, EngineSettings, build_engine};
use palaver_core::identity::resolver::IdentityResolver;
use palaver_core::llm::box_provider::BoxLlmProvider;
use palaver_infra::config::load_global_config;
use palaver_infra::filesystem::{database_url, ensure_data_dir, resolve_data_dir};
use palaver_infra::llm::provider_from_env;
use palaver_infra::sqlite::chat_record::SqliteChatRecordRepository;
use palaver_infra::sqlite::context::SqliteContextRepository;
use palaver_infra::sqlite::kv::SqliteKeyValueStore;
use palaver_infra::sqlite::pool::DatabasePool;
use palaver_types::bot::BotConfig;
use palaver_types::config::GlobalConfig;
use palaver_types::error::ChatError;

/// Concrete engine pinned to the SQLite repositories.
pub type ConcreteEngine = ChatEngine<SqliteChatRecordRepository, SqliteContextRepository>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub identity: Arc<IdentityResolver<SqliteKeyValueStore>>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let provider = provider_from_env(&config.provider);

        Ok(Self::from_parts(db_pool, provider, config, data_dir))
    }

    /// Wire services from already-built parts.
    pub fn from_parts(
        db_pool: DatabasePool,
        provider: BoxLlmProvider,
        config: GlobalConfig,
        data_dir: PathBuf,
    ) -> Self {
        let records = Arc::new(SqliteChatRecordRepository::new(db_pool.clone()));
        let contexts = Arc::new(SqliteContextRepository::new(db_pool.clone()));

        let engine = build_engine(
            StreamingAccumulator::new(Arc::new(provider)),
            records,
            contexts,
            config.usage.quotas.clone(),
            config.usage.reset_anchor,
            EngineSettings {
                persist_partial: config.chat.persist_partial,
            },
        );

        let token_ttl =
            Duration::from_secs(u64::from(config.chat.session_token_ttl_days) * 24 * 60 * 60);
        let identity = IdentityResolver::new(SqliteKeyValueStore::new(db_pool))
            .with_token_ttl(token_ttl);

        Self {
            engine: Arc::new(engine),
            identity: Arc::new(identity),
            config: Arc::new(config),
            data_dir,
        }
    }

    /// Look up a configured bot.
    pub fn bot(&self, bot_id: &str) -> Result<BotConfig, ChatError> {
        self.config
            .bot(bot_id)
            .ok_or_else(|| ChatError::UnknownBot(bot_id.to_string()))
    }

    /// Test state backed by a temp-dir database and a scripted provider.
    #[cfg(test)]
    pub async fn for_tests(
        dir: &std::path::Path,
        provider: palaver_core::llm::scripted::ScriptedProvider,
        config: GlobalConfig,
    ) -> Self {
        let db_pool = DatabasePool::new(&database_url(dir)).await.unwrap();
        Self::from_parts(
            db_pool,
            BoxLlmProvider::new(provider),
            config,
            dir.to_path_buf(),
        )
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> GlobalConfig {
    use palaver_types::bot::{RawBotConfig, RawModelSpec};

    GlobalConfig {
        raw_bots: vec![RawBotConfig {
            id: "helper".to_string(),
            name: "Helper".to_string(),
            avatar: Some("🦉".to_string()),
            system_prompt: Some("Be brief.".to_string()),
            model: Some(RawModelSpec::Name("gpt-4o-mini".to_string())),
        }],
        ..GlobalConfig::default()
    }
}
