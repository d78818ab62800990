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

use std::collections::{HashMap, HashSet};

use super::{classify, Taxonomy};
use crate::registry::NodeRecord;

// Tree levels, root downwards: country -> provider -> OS -> client -> node ids
type ClientMap = HashMap<String, HashSet<String>>;
type OsMap = HashMap<String, ClientMap>;
type IspMap = HashMap<String, OsMap>;
type CountryMap = HashMap<String, IspMap>;

/// The classified path a node's leaf edge hangs from.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LeafPath {
    country: String,
    isp: String,
    os: String,
    client: String,
}

/// Aggregate graph sizes exposed over RPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphCounts {
    /// Category nodes, root included
    pub category_nodes: usize,
    /// Edges from client categories to node identifiers
    pub leaf_edges: usize,
}

/// Derived hierarchical projection of the registry:
/// Root → Country → Provider → OS → Client → node leaf edges.
///
/// Merging is idempotent: re-inserting an existing category path or leaf
/// edge is a no-op, and a node whose classification changed between runs
/// is re-homed (old leaf edge detached, new one attached) so the graph
/// always mirrors the current registry contents.
#[derive(Default)]
pub struct TaxonomyGraph {
    countries: CountryMap,
    /// Node id to its current leaf path, for detach and re-homing
    leaf_index: HashMap<String, LeafPath>,
}

impl TaxonomyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a record and ensure its category path and leaf edge exist.
    pub fn merge_node(&mut self, record: &NodeRecord) {
        let path = LeafPath {
            country: classify(Taxonomy::Country, record.country.as_deref()),
            isp: classify(Taxonomy::Isp, record.isp_raw.as_deref()),
            os: classify(Taxonomy::Os, record.os_raw.as_deref()),
            client: classify(Taxonomy::Client, record.client_raw.as_deref()),
        };

        let current = self.leaf_index.get(&record.id).cloned();
        if current.as_ref() == Some(&path) {
            return
        }
        if current.is_some() {
            self.detach(&record.id);
        }

        self.countries
            .entry(path.country.clone())
            .or_default()
            .entry(path.isp.clone())
            .or_default()
            .entry(path.os.clone())
            .or_default()
            .entry(path.client.clone())
            .or_default()
            .insert(record.id.clone());

        self.leaf_index.insert(record.id.clone(), path);
    }

    /// Fold a full registry snapshot into the graph.
    pub fn rebuild(&mut self, snapshot: &[NodeRecord]) {
        for record in snapshot {
            self.merge_node(record);
        }
    }

    /// Remove a node's leaf edge and prune any category branch left empty.
    /// Returns false if the node was not present.
    pub fn detach(&mut self, id: &str) -> bool {
        let Some(path) = self.leaf_index.remove(id) else { return false };

        let Some(isps) = self.countries.get_mut(&path.country) else { return true };
        if let Some(oses) = isps.get_mut(&path.isp) {
            if let Some(clients) = oses.get_mut(&path.os) {
                if let Some(leaves) = clients.get_mut(&path.client) {
                    leaves.remove(id);
                    if leaves.is_empty() {
                        clients.remove(&path.client);
                    }
                }
                if clients.is_empty() {
                    oses.remove(&path.os);
                }
            }
            if oses.is_empty() {
                isps.remove(&path.isp);
            }
        }
        if isps.is_empty() {
            self.countries.remove(&path.country);
        }

        true
    }

    /// All node identifiers reachable by traversing Root through the given
    /// country node, sorted. Unknown countries yield an empty list.
    pub fn country_nodes(&self, country: &str) -> Vec<String> {
        let mut ids = vec![];

        if let Some(isps) = self.countries.get(country) {
            for oses in isps.values() {
                for clients in oses.values() {
                    for leaves in clients.values() {
                        ids.extend(leaves.iter().cloned());
                    }
                }
            }
        }

        ids.sort();
        ids
    }

    pub fn counts(&self) -> GraphCounts {
        let mut category_nodes = 1; // the implicit root
        let mut leaf_edges = 0;

        for isps in self.countries.values() {
            category_nodes += 1;
            for oses in isps.values() {
                category_nodes += 1;
                for clients in oses.values() {
                    category_nodes += 1;
                    for leaves in clients.values() {
                        category_nodes += 1;
                        leaf_edges += leaves.len();
                    }
                }
            }
        }

        GraphCounts { category_nodes, leaf_edges }
    }
}
