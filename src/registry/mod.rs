/* This file is part of Nodemap (https://codeberg.org/nodemap/nodemap)
 *
 * Copyright (C) 2024-2026 Nodemap developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Canonical node registry: idempotent upsert, failure-count eviction,
//! and the read-only query surface used by the RPC layer.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use log::{debug, info, warn};
use smol::lock::RwLock;
use tinyjson::JsonValue;

use crate::{
    util::{
        file::{load_json_file, save_json_file},
        time::Timestamp,
    },
    Error, Result,
};

/// Node record definitions
pub mod node;
pub use node::{GeoInfo, NodeRecord};

pub type NodeRegistryPtr = Arc<NodeRegistry>;

/// Outcome of a single registry upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Previously-unknown reachable node was registered
    Created,
    /// Known node was refreshed from a successful liveness check
    Updated,
    /// Known node failed its liveness check, failure counter incremented
    Flagged,
    /// Unknown and unreachable, not registered
    Skipped,
}

/// Queryable record fields for equality filtering and distinct listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterField {
    Client,
    Os,
    Isp,
    Country,
}

impl FromStr for FilterField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Self::Client),
            "os" => Ok(Self::Os),
            "isp" => Ok(Self::Isp),
            "country" => Ok(Self::Country),
            _ => Err(Error::UnknownTaxonomy(s.to_string())),
        }
    }
}

impl FilterField {
    fn value_of<'a>(&self, record: &'a NodeRecord) -> Option<&'a String> {
        match self {
            Self::Client => record.client_raw.as_ref(),
            Self::Os => record.os_raw.as_ref(),
            Self::Isp => record.isp_raw.as_ref(),
            Self::Country => record.country.as_ref(),
        }
    }
}

/// Validate a node identifier at the registry boundary.
/// Identifiers are opaque but must be non-empty hex strings.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || hex::decode(id).is_err() {
        return Err(Error::MalformedNodeId(id.to_string()))
    }
    Ok(())
}

/// In-memory node store with an explicit open/save lifecycle.
///
/// Opened once at process start from a JSON snapshot, mutated only by the
/// pipeline orchestrator, and written back after each run and at shutdown.
/// Readers may query concurrently at any time and observe each upsert as
/// an atomic unit.
pub struct NodeRegistry {
    /// Snapshot file path
    path: PathBuf,
    /// Records flagged this many times are removed by [`evictable()`]
    eviction_threshold: u64,
    records: RwLock<HashMap<String, NodeRecord>>,
}

impl NodeRegistry {
    /// Open the registry, loading the snapshot at `path` if one exists.
    /// A missing snapshot yields an empty registry.
    pub fn open(path: &Path, eviction_threshold: u64) -> Result<NodeRegistryPtr> {
        let mut records = HashMap::new();

        match load_json_file(path) {
            Ok(snapshot) => {
                let Some(map) = snapshot.get::<HashMap<String, JsonValue>>() else {
                    return Err(Error::ParseFailed("Registry snapshot is not an object"))
                };

                for (id, value) in map {
                    match NodeRecord::from_json(value) {
                        Ok(record) => {
                            records.insert(id.clone(), record);
                        }
                        Err(e) => {
                            warn!(target: "registry", "Skipping malformed record {}: {}", id, e)
                        }
                    }
                }

                info!(target: "registry", "Loaded {} node records from {:?}", records.len(), path);
            }
            Err(Error::Io(std::io::ErrorKind::NotFound)) => {
                info!(target: "registry", "No existing snapshot at {:?}, starting empty", path);
            }
            Err(e) => return Err(e),
        }

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            eviction_threshold,
            records: RwLock::new(records),
        }))
    }

    /// Write the current registry contents back to the snapshot file.
    pub async fn save(&self) -> Result<()> {
        let records = self.records.read().await;
        let map: HashMap<String, JsonValue> =
            records.iter().map(|(id, record)| (id.clone(), record.to_json())).collect();
        drop(records);

        save_json_file(&self.path, &JsonValue::Object(map), true)?;
        debug!(target: "registry", "Saved snapshot to {:?}", self.path);
        Ok(())
    }

    /// Create-or-update a node observation. Idempotent per identifier.
    ///
    /// * Unknown and reachable: register with a zeroed failure counter.
    /// * Known and reachable: reset the failure counter, refresh the raw
    ///   discovery tags, and merge any provided geo fields as a unit.
    /// * Known and unreachable: increment the failure counter only.
    /// * Unknown and unreachable: no-op.
    pub async fn upsert(
        &self,
        id: &str,
        host: &str,
        port: u16,
        client_raw: Option<String>,
        os_raw: Option<String>,
        reachable: bool,
        geo: Option<&GeoInfo>,
    ) -> Result<UpsertOutcome> {
        validate_id(id)?;

        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(id) else {
            if !reachable {
                return Ok(UpsertOutcome::Skipped)
            }

            let record =
                NodeRecord::new(id.to_string(), host.to_string(), port, client_raw, os_raw, geo);
            records.insert(id.to_string(), record);
            return Ok(UpsertOutcome::Created)
        };

        record.updated_at = Some(Timestamp::current_time());

        if !reachable {
            record.failure_count += 1;
            return Ok(UpsertOutcome::Flagged)
        }

        record.failure_count = 0;
        record.host = host.to_string();
        record.port = port;
        if client_raw.is_some() {
            record.client_raw = client_raw;
        }
        if os_raw.is_some() {
            record.os_raw = os_raw;
        }
        if let Some(geo) = geo {
            record.apply_geo(geo);
        }

        Ok(UpsertOutcome::Updated)
    }

    /// Identifiers whose failure counter has reached the eviction threshold.
    /// The caller detaches them from the taxonomy graph before removal.
    pub async fn evictable(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.failure_count >= self.eviction_threshold)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Identifiers that were re-observed at least once but never enriched.
    /// Used by the optional cleanup pass.
    pub async fn unenriched(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.updated_at.is_some() && r.is_unenriched())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Remove the given identifiers, returning how many were present.
    pub async fn remove_nodes(&self, ids: &[String]) -> usize {
        let mut records = self.records.write().await;
        ids.iter().filter(|id| records.remove(*id).is_some()).count()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Result<Option<NodeRecord>> {
        validate_id(id)?;
        Ok(self.records.read().await.get(id).cloned())
    }

    /// Full registry contents, in no particular order.
    pub async fn snapshot(&self) -> Vec<NodeRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// The `n` most recently created records, newest first.
    pub async fn latest(&self, n: usize) -> Vec<NodeRecord> {
        let mut records = self.snapshot().await;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        records.truncate(n);
        records
    }

    /// Records whose `field` equals `value`, compared case-insensitively.
    pub async fn filter_by(&self, field: FilterField, value: &str) -> Vec<NodeRecord> {
        let value = value.to_lowercase();
        self.records
            .read()
            .await
            .values()
            .filter(|r| field.value_of(r).is_some_and(|v| v.to_lowercase() == value))
            .cloned()
            .collect()
    }

    /// Sorted distinct non-null values of `field` across the registry.
    pub async fn distinct(&self, field: FilterField) -> Vec<String> {
        let mut values: Vec<String> =
            self.records.read().await.values().filter_map(|r| field.value_of(r).cloned()).collect();
        values.sort();
        values.dedup();
        values
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn geo() -> GeoInfo {
        GeoInfo {
            latitude: 50.11,
            longitude: 8.68,
            isp: "Hetzner Online GmbH".to_string(),
            country: "Germany".to_string(),
        }
    }

    fn open_empty(dir: &TempDir) -> NodeRegistryPtr {
        NodeRegistry::open(&dir.path().join("nodes.json"), 3).unwrap()
    }

    #[test]
    fn upsert_is_idempotent() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            let outcome = registry
                .upsert("aa01", "203.0.113.7", 30303, None, None, true, Some(&geo()))
                .await
                .unwrap();
            assert_eq!(outcome, UpsertOutcome::Created);

            let outcome = registry
                .upsert("aa01", "203.0.113.7", 30303, None, None, true, Some(&geo()))
                .await
                .unwrap();
            assert_eq!(outcome, UpsertOutcome::Updated);

            assert_eq!(registry.count().await, 1);
            let record = registry.get("aa01").await.unwrap().unwrap();
            assert_eq!(record.failure_count, 0);
            assert_eq!(record.country.as_deref(), Some("Germany"));
            assert!(record.updated_at.is_some());
        });
    }

    #[test]
    fn unknown_unreachable_is_skipped() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            let outcome =
                registry.upsert("aa01", "203.0.113.7", 30303, None, None, false, None).await.unwrap();
            assert_eq!(outcome, UpsertOutcome::Skipped);
            assert_eq!(registry.count().await, 0);
        });
    }

    #[test]
    fn failure_count_reaches_threshold() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();

            for i in 1..=3u64 {
                let outcome = registry
                    .upsert("aa01", "203.0.113.7", 30303, None, None, false, None)
                    .await
                    .unwrap();
                assert_eq!(outcome, UpsertOutcome::Flagged);
                assert_eq!(registry.get("aa01").await.unwrap().unwrap().failure_count, i);

                // Evictable iff the threshold (3) has been reached
                let evictable = registry.evictable().await;
                assert_eq!(evictable.len(), usize::from(i >= 3));
            }

            let evictable = registry.evictable().await;
            assert_eq!(registry.remove_nodes(&evictable).await, 1);
            assert_eq!(registry.count().await, 0);
        });
    }

    #[test]
    fn failure_count_resets_on_success() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();
            registry.upsert("aa01", "203.0.113.7", 30303, None, None, false, None).await.unwrap();
            registry.upsert("aa01", "203.0.113.7", 30303, None, None, false, None).await.unwrap();
            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();

            assert_eq!(registry.get("aa01").await.unwrap().unwrap().failure_count, 0);
        });
    }

    #[test]
    fn unenriched_requires_reobservation() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            // aa01 is re-observed without geo data, bb02 is only created,
            // cc03 is re-observed but was enriched at creation
            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();
            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();
            registry.upsert("bb02", "203.0.113.8", 30303, None, None, true, None).await.unwrap();
            registry
                .upsert("cc03", "203.0.113.9", 30303, None, None, true, Some(&geo()))
                .await
                .unwrap();
            registry.upsert("cc03", "203.0.113.9", 30303, None, None, true, None).await.unwrap();

            assert_eq!(registry.unenriched().await, vec!["aa01".to_string()]);
        });
    }

    #[test]
    fn malformed_id_is_rejected() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            let result =
                registry.upsert("not-hex!", "203.0.113.7", 30303, None, None, true, None).await;
            assert!(matches!(result, Err(Error::MalformedNodeId(_))));
            assert!(matches!(registry.get("").await, Err(Error::MalformedNodeId(_))));
        });
    }

    #[test]
    fn snapshot_roundtrip() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let path = dir.path().join("nodes.json");

            let registry = NodeRegistry::open(&path, 3).unwrap();
            registry
                .upsert("aa01", "203.0.113.7", 30303, Some("Geth/v1.13".to_string()), None, true, Some(&geo()))
                .await
                .unwrap();
            registry.upsert("bb02", "203.0.113.8", 30303, None, None, true, None).await.unwrap();
            registry.save().await.unwrap();

            let reopened = NodeRegistry::open(&path, 3).unwrap();
            assert_eq!(reopened.count().await, 2);
            let record = reopened.get("aa01").await.unwrap().unwrap();
            assert_eq!(record.client_raw.as_deref(), Some("Geth/v1.13"));
            assert_eq!(record.isp_raw.as_deref(), Some("Hetzner Online GmbH"));
        });
    }

    #[test]
    fn latest_orders_by_creation() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            registry.upsert("aa01", "203.0.113.7", 30303, None, None, true, None).await.unwrap();
            registry.upsert("bb02", "203.0.113.8", 30303, None, None, true, None).await.unwrap();
            registry.upsert("cc03", "203.0.113.9", 30303, None, None, true, None).await.unwrap();

            // Force distinct creation times
            {
                let mut records = registry.records.write().await;
                records.get_mut("aa01").unwrap().created_at = Timestamp(100);
                records.get_mut("bb02").unwrap().created_at = Timestamp(300);
                records.get_mut("cc03").unwrap().created_at = Timestamp(200);
            }

            let latest = registry.latest(2).await;
            assert_eq!(latest.len(), 2);
            assert_eq!(latest[0].id, "bb02");
            assert_eq!(latest[1].id, "cc03");
        });
    }

    #[test]
    fn filter_is_case_insensitive() {
        smol::block_on(async {
            let dir = TempDir::new("registry").unwrap();
            let registry = open_empty(&dir);

            registry
                .upsert("aa01", "203.0.113.7", 30303, None, None, true, Some(&geo()))
                .await
                .unwrap();
            registry.upsert("bb02", "203.0.113.8", 30303, None, None, true, None).await.unwrap();

            let hits = registry.filter_by(FilterField::Country, "gErMaNy").await;
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].id, "aa01");

            let distinct = registry.distinct(FilterField::Country).await;
            assert_eq!(distinct, vec!["Germany".to_string()]);
        });
    }
}
