pub mod approvals;
pub mod events;
pub mod executions;
pub mod idempotency;
pub mod jobs;
pub mod locks;
pub mod messages;

pub use approvals::{ApprovalRepo, PgApprovalRepo};
pub use events::PgEventSink;
pub use executions::{ExecutionRepo, PgExecutionRepo};
pub use idempotency::{IdempotencyRow, PgIdempotencyRepo};
pub use jobs::{JobRepo, PgJobRepo};
pub use locks::{LockRow, PgLockRepo};
pub use messages::{MessageRepo, PgMessageRepo};
