pub mod canonical;
pub mod ledger;
pub mod model;

pub use canonical::canonicalize;
pub use ledger::{append_audit, verify_chain};
pub use model::{AuditActor, AuditError, AuditEvent, AuditResult, ChainVerification};
