//! Integration tests for Searchlab Audit
//!
//! Runs the request audit under a live scheduler against the file-backed
//! store and reads the results back through the table registry.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use searchlab_audit::{AuditScheduler, AuditTask, RequestAudit};
use searchlab_common::SearchlabConfig;
use searchlab_storage::{LocalBackend, StorageBackend, StoragePath};
use searchlab_table::TableRegistry;
use tempfile::TempDir;

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_scheduled_audit_publishes_and_persists() {
    let dir = TempDir::new().expect("temp dir should be created");
    let mut config = SearchlabConfig::development();
    config.storage.data_directory = dir.path().to_path_buf();
    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalBackend::new(config.storage.data_directory.clone()).expect("backend should be created"),
    );

    let audit = Arc::new(RequestAudit::from_config(&config, storage.clone()).expect("audit should be created"));
    let registry = TableRegistry::new();
    registry.register_shared("requests", audit.requests_snapshot());
    registry.register_shared("visitors", audit.visitors_snapshot());

    let scheduler = AuditScheduler::new(
        Duration::from_millis(50),
        vec![audit.clone() as Arc<dyn AuditTask>],
    );
    audit.event("alice", "10.0.0.1");
    audit.event("alice", "10.0.0.1");
    audit.event("bob", "10.0.0.2");
    scheduler.start().expect("scheduler should start");

    assert!(wait_for(|| audit.requests_snapshot().size() == 2));
    scheduler.stop();
    assert!(scheduler.cycles() >= 1);

    let alice = registry
        .where_("requests", &["view.id:alice"])
        .expect("query should succeed");
    assert_eq!(alice.size(), 1);
    assert_eq!(alice.aggregate_int("data.requests"), 2);

    let visitors = registry.get_table("visitors").expect("table should exist");
    assert_eq!(visitors.aggregate_int("data.visitors"), 2);

    let requests_path = StoragePath::new(config.storage.bucket.as_str(), &config.audit.requests_path);
    assert!(storage.exists(&requests_path).expect("exists should succeed"));
}
