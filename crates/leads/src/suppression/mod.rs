//! Suppression list, contact cadence, and vendor sync.

mod bulk;
mod guard;
mod sendgrid;
mod sync;

pub use bulk::{BulkCheckReport, ContactStatus, LeadContactStatus};
pub use guard::{CadenceStatus, ContactCheck, NotReady, OutreachDecision, SuppressionGuard};
pub use sendgrid::SendGridFeed;
pub use sync::{
    AsmGroup, FeedEntry, FeedKind, FeedSyncReport, SuppressionSync, SyncProgress, SyncReport,
    VendorSuppressionFeed,
};
