//! Data reconciliation and instance group checks

pub mod orchestrator;
pub mod reconcile;
pub mod types;

pub use orchestrator::{
    get_group_sync_status, sync_group_table, GroupChecks, GroupSyncStatus, Member, TargetState,
    TargetStatus, TargetSync,
};
pub use reconcile::{get_table_row_counts, sync_table_data, DEFAULT_BATCH_SIZE};
pub use types::{PendingCounts, RowDiff, SchemaScope, SyncOptions, SyncResult};
