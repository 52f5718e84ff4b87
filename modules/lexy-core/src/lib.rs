pub mod account;
pub mod analysis;
pub mod backend;
pub mod bookmarks;
pub mod config;
pub mod credits;
pub mod discussion;
pub mod error;
pub mod fetcher;
pub mod generation;
pub mod history;
pub mod identity;
pub mod markup;
pub mod notice;
pub mod pagination;
pub mod prompts;
pub mod query;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use account::{AccountStore, HttpAccountStore, MemoryAccountStore};
pub use analysis::{AnalysisEvent, AnalysisOrchestrator, AnalysisState};
pub use backend::{HttpBackend, LexyBackend};
pub use bookmarks::{AddOutcome, BookmarkRepository, BookmarkService, LocalBookmarks, RemoteBookmarks};
pub use config::ClientConfig;
pub use credits::CreditGate;
pub use discussion::{DialogState, DiscussionDialog, OpenOutcome};
pub use error::{AnalysisError, BackendError, GateDenial, StoreError, TransitionError};
pub use fetcher::{ResultFetcher, SearchOutcome};
pub use generation::{RequestGeneration, RequestToken};
pub use history::HistoryLog;
pub use identity::Identity;
pub use markup::{Block, Document, Inline};
pub use notice::{Notice, NoticeAction, NoticeLevel, Notifier, TracingNotifier};
pub use pagination::{LoadMore, PageState, Paginator, SentinelTrigger};
pub use query::{build_query, build_query_on, Platform, SiteSelection};
pub use session::{ResultCount, SearchController, SearchInput, SearchSession};
pub use store::{FileKv, KvBackend, LocalStore, MemoryKv, StorageKey};
