//! Searchlab Audit Task
//!
//! @version 0.1.0
//! @author Searchlab Development Team

/// Unit of periodic work run by a scheduler.
///
/// `check` handles its own failures; a scheduler only measures how long it
/// takes.
pub trait AuditTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn check(&self);
}
