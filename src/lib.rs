//! Multi-Provider LLM Request Router
//!
//! Issues a single logical "ask a language model" operation against a
//! prioritized, configurable list of (backend, model) endpoints. Endpoints
//! that are over quota or currently unhealthy are skipped, and failures fall
//! back to the next candidate until one answers or the list is exhausted.
//!
//! The moving parts:
//! - [`Router`]: orchestrates one query across the candidate list.
//! - [`UsageTracker`]: sliding-window RPM and calendar-day RPD accounting,
//!   persisted across restarts through a [`UsageStore`].
//! - [`CircuitBreakerRegistry`]: in-memory per-endpoint health gate.
//! - [`Backend`]: the adapter contract each provider integration implements;
//!   [`HttpBackend`] covers OpenAI-compatible HTTP APIs.
//!
//! ```no_run
//! use std::sync::Arc;
//! use llm_router::{BackendRegistry, ConfigLoader, HttpBackend, QueryOptions, Router};
//!
//! # async fn run() -> llm_router::Result<()> {
//! let config = ConfigLoader::new()?.into_config();
//!
//! let mut backends = BackendRegistry::new();
//! backends.register(Arc::new(HttpBackend::from_env(
//!     "openai",
//!     "https://api.openai.com/v1",
//!     "OPENAI_API_KEY",
//! )));
//!
//! let router = Router::new(config, backends).await?;
//! let answer = router.query("Summarize this feed entry", &QueryOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod router;
pub mod storage;
pub mod usage;

pub use backend::{Backend, BackendRegistry, HttpBackend, QueryOptions};
pub use config::{ConfigLoader, RouterConfig, StorageBackendKind};
pub use error::{AttemptLog, BackendError, Result, RouterError, SkipReason};
pub use router::{CircuitBreakerRegistry, Endpoint, Router, DEFAULT_FAILURE_THRESHOLD};
pub use storage::{FileStore, SqliteStore, UsageRecord, UsageStore};
pub use usage::UsageTracker;
