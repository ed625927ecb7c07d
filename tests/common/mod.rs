// Shared test helpers

use statdash::models::Payload;
use statdash::snapshot_repo::SnapshotRepo;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh initialized repo on a temp SQLite file. Keep the TempDir alive for
/// the duration of the test.
#[allow(dead_code)]
pub async fn temp_repo() -> (TempDir, Arc<SnapshotRepo>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.db");
    let repo = SnapshotRepo::connect(path.to_str().unwrap(), 2)
        .await
        .unwrap();
    repo.init().await.unwrap();
    (dir, Arc::new(repo))
}

/// Payload with a single subSource:field value.
#[allow(dead_code)]
pub fn payload(sub: &str, field: &str, value: f64) -> Payload {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), value);
    let mut payload = Payload::new();
    payload.insert(sub.to_string(), fields);
    payload
}

/// Payload with several fields under one subSource.
#[allow(dead_code)]
pub fn payload_fields(sub: &str, fields: &[(&str, f64)]) -> Payload {
    let mut map = BTreeMap::new();
    for (name, value) in fields {
        map.insert(name.to_string(), *value);
    }
    let mut payload = Payload::new();
    payload.insert(sub.to_string(), map);
    payload
}
