//! Agora background workers
//!
//! Three worker loops own all deferred work: deadline enforcement, webhook
//! delivery with retry, and the wallet watcher. Workers hold no state of
//! their own; all progress is persisted, and each worker's startup recovery
//! rebuilds its schedule from the database, so a crash or key-value-store
//! wipe costs at most one restart's latency.
//!
//! Shutdown: each loop watches a shutdown signal and finishes its current
//! unit before exiting. In-flight database transactions always run to a
//! commit or rollback decision.

pub mod chain;
pub mod deadline;
pub mod wallet;
pub mod webhook;

pub use chain::{ChainClient, JsonRpcChainClient, TxStatus, UsdcTransfer};
pub use deadline::DeadlineWorker;
pub use wallet::{WalletConfig, WalletService};
pub use webhook::{backoff_delay, WebhookConfig, WebhookDispatcher};

/// Shutdown signal shared by all worker loops. Senders flip it to true once.
pub type ShutdownRx = tokio::sync::watch::Receiver<bool>;
