//! Data Module
//!
//! The element sync engine: cache, filters, dashboard overview and the
//! coordinator that keeps them in step with the remote engine.

pub mod cache;
pub mod coordinator;
pub mod events;
pub mod filter;
pub mod observable;
pub mod overview;

pub use cache::{ElementCache, MergeMode};
pub use coordinator::{BulkStatus, FetchCoordinator, FetchSettings};
pub use events::{SyncEvent, SyncEventBus};
pub use filter::{apply_filters, DataFilter, FilterBuilder, MatchType};
pub use observable::Observable;
pub use overview::{overview, Dashboard, OverviewCounts, OverviewTile};
