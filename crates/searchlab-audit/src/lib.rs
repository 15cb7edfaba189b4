//! Searchlab Audit - Periodic Audit Tasks
//!
//! Background bookkeeping for the Searchlab store. Request handlers record
//! events into a non-blocking buffer; audit tasks fold them into minute
//! series tables on a fixed cycle driven by a scheduler thread.
//!
//! Key Features:
//! - Audit task contract and event buffer
//! - Request and visitor counting with persistence and reload
//! - Fixed-period scheduler with escalation to concurrent execution
//! - Per-task frequency scheduling
//!
//! @version 0.1.0
//! @author Searchlab Development Team

pub mod buffer;
pub mod request_audit;
pub mod scheduler;
pub mod task;

pub use buffer::{EventBuffer, Observation};
pub use request_audit::RequestAudit;
pub use scheduler::{AuditScheduler, FrequencyScheduler, SchedulerMode};
pub use task::AuditTask;
