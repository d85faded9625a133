/// Fjall-based persistence for job outcomes
///
/// Live job state is in memory only; this module stores one
/// [`HistoryRecord`] per job once it reaches a terminal status. Fjall (an
/// embedded LSM key-value store) keeps:
///
/// - History records keyed by job id
/// - A recency index for newest-first listing
///
/// ## Usage
///
/// ```rust,ignore
/// use mediafetch::ledger::{HistoryQuery, HistoryStore};
///
/// let store = HistoryStore::open("data/history")?;
/// store.upsert(record)?;
/// let latest = store.list(&HistoryQuery::default())?;
/// ```

pub mod error;
pub mod models;
pub mod partitions;
pub mod store;

pub use error::{LedgerError, Result};
pub use models::{DEFAULT_PAGE_SIZE, HistoryQuery, HistoryRecord};
pub use store::{HistoryStore, StoreStats};
