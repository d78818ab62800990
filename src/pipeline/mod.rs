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

//! Pipeline orchestrator: sequences a discovery batch through probing,
//! enrichment, registry upsert and graph rebuild, one stage at a time.
use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{info, warn};
use smol::lock::Mutex;

use crate::{
    registry::{GeoInfo, NodeRegistryPtr, UpsertOutcome},
    system::{
        publisher::{Publisher, PublisherPtr, Subscription},
        timeout::timeout,
    },
    taxonomy::TaxonomyGraph,
    util::time::Timestamp,
    Error, Result,
};

/// Pipeline tunables
pub mod settings;
pub use settings::{Settings, SettingsOpt};

/// Discovery source boundary
pub mod discovery;
pub use discovery::{DiscoverySource, HttpDiscovery, NodeCandidate};

/// TCP liveness probing
pub mod probe;
pub use probe::Prober;

/// Geolocation enrichment
pub mod geo;
pub use geo::GeoClient;

/// Shared handle to the derived taxonomy graph.
pub type GraphPtr = Arc<Mutex<TaxonomyGraph>>;

pub type PipelinePtr = Arc<Pipeline>;

/// Orchestrator stages. Transitions are strictly sequential within a run
/// and a new run may not start while any non-idle stage is occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Discovering,
    Probing,
    Enriching,
    Upserting,
    GraphRebuilding,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Probing => "probing",
            Self::Enriching => "enriching",
            Self::Upserting => "upserting",
            Self::GraphRebuilding => "graph_rebuilding",
        }
    }
}

/// Per-run counters logged at the end of each pipeline invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub probed: usize,
    pub reachable: usize,
    pub enriched_hosts: usize,
    pub created: usize,
    pub updated: usize,
    pub flagged: usize,
    pub evicted: usize,
    pub purged: usize,
    pub graph_category_nodes: usize,
    pub graph_leaf_edges: usize,
}

/// Single-flight pipeline orchestrator. The registry and graph are only
/// mutated from here; the RPC layer reads them concurrently and observes
/// each upsert as an atomic unit.
pub struct Pipeline {
    settings: Settings,
    source: Box<dyn DiscoverySource>,
    prober: Prober,
    geo: GeoClient,
    registry: NodeRegistryPtr,
    graph: GraphPtr,
    state: Mutex<PipelineState>,
    run_publisher: PublisherPtr<RunSummary>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        source: Box<dyn DiscoverySource>,
        registry: NodeRegistryPtr,
        graph: GraphPtr,
    ) -> PipelinePtr {
        let prober = Prober::new(&settings);
        let geo = GeoClient::new(&settings);

        Arc::new(Self {
            settings,
            source,
            prober,
            geo,
            registry,
            graph,
            state: Mutex::new(PipelineState::Idle),
            run_publisher: Publisher::new(),
        })
    }

    /// Subscribe to the summaries of completed runs.
    pub async fn subscribe_runs(&self) -> Subscription<RunSummary> {
        self.run_publisher.clone().subscribe().await
    }

    /// Current orchestrator stage.
    pub async fn state(&self) -> PipelineState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: PipelineState) {
        *self.state.lock().await = state;
    }

    /// Run an I/O stage under the configured stage timeout. On timeout the
    /// stage's partial results are kept and the remaining work is skipped
    /// until the next scheduled run.
    async fn bounded_stage<F>(&self, stage: PipelineState, fut: F)
    where
        F: std::future::Future<Output = ()>,
    {
        if self.settings.stage_timeout == 0 {
            fut.await;
            return
        }

        let dur = Duration::from_secs(self.settings.stage_timeout);
        if timeout(dur, fut).await.is_err() {
            warn!(
                target: "pipeline::run",
                "Stage {} hit the {}s timeout, continuing with partial results",
                stage.name(), self.settings.stage_timeout
            );
        }
    }

    /// Execute one full pipeline run. Returns [`Error::PipelineBusy`] if a
    /// prior run still occupies any non-idle stage.
    pub async fn run_once(&self) -> Result<RunSummary> {
        {
            let mut state = self.state.lock().await;
            if *state != PipelineState::Idle {
                return Err(Error::PipelineBusy)
            }
            *state = PipelineState::Discovering;
        }

        let started = Timestamp::current_time();
        let result = self.run_stages().await;
        self.set_state(PipelineState::Idle).await;

        match &result {
            Ok(summary) => {
                self.run_publisher.notify(*summary).await;
                info!(
                    target: "pipeline::run",
                    "Run finished in {}s: discovered={} probed={} reachable={} enriched_hosts={} \
                     created={} updated={} flagged={} evicted={} purged={} graph={}/{}",
                    started.elapsed(), summary.discovered, summary.probed, summary.reachable,
                    summary.enriched_hosts, summary.created, summary.updated, summary.flagged,
                    summary.evicted, summary.purged, summary.graph_category_nodes,
                    summary.graph_leaf_edges
                );
            }
            Err(e) => warn!(target: "pipeline::run", "Run failed: {}", e),
        }

        result
    }

    async fn run_stages(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        // Discovering
        let candidates = self.source.fetch_candidates().await?;
        summary.discovered = candidates.len();
        info!(target: "pipeline::run", "Discovered {} candidate nodes", summary.discovered);

        // Probing
        self.set_state(PipelineState::Probing).await;
        let probe_results = Mutex::new(HashMap::new());
        self.bounded_stage(PipelineState::Probing, self.prober.probe_batch(&candidates, &probe_results))
            .await;
        let probe_results = probe_results.into_inner();
        summary.probed = probe_results.len();
        summary.reachable = probe_results.values().filter(|r| **r).count();

        // Enriching
        self.set_state(PipelineState::Enriching).await;
        let geo_results = self.enrich(&candidates, &probe_results, &mut summary).await;

        // Upserting
        self.set_state(PipelineState::Upserting).await;
        self.upsert_batch(&candidates, &probe_results, &geo_results, &mut summary).await;
        let evicted = self.maintenance(&mut summary).await;

        // GraphRebuilding
        self.set_state(PipelineState::GraphRebuilding).await;
        let snapshot = self.registry.snapshot().await;
        let mut graph = self.graph.lock().await;
        for id in &evicted {
            graph.detach(id);
        }
        graph.rebuild(&snapshot);
        let counts = graph.counts();
        drop(graph);
        summary.graph_category_nodes = counts.category_nodes;
        summary.graph_leaf_edges = counts.leaf_edges;

        self.registry.save().await?;

        Ok(summary)
    }

    /// Look up geo data for reachable hosts that still need it, memoized
    /// per host so shared hosts cost one provider call.
    async fn enrich(
        &self,
        candidates: &[NodeCandidate],
        probe_results: &HashMap<String, bool>,
        summary: &mut RunSummary,
    ) -> HashMap<String, GeoInfo> {
        if !self.geo.enabled() {
            info!(target: "pipeline::run", "No geo API key configured, skipping enrichment");
            return HashMap::new()
        }

        let mut hosts = vec![];
        for candidate in candidates {
            if !probe_results.get(&candidate.id).copied().unwrap_or(false) {
                continue
            }

            // Already-enriched records keep their stale-but-valid fields
            let needs_geo = match self.registry.get(&candidate.id).await {
                Ok(Some(record)) => record.is_unenriched(),
                Ok(None) => true,
                Err(_) => false,
            };
            if needs_geo && !hosts.contains(&candidate.host) {
                hosts.push(candidate.host.clone());
            }
        }

        let geo_results = Mutex::new(HashMap::new());
        self.bounded_stage(PipelineState::Enriching, self.geo.enrich_batch(&hosts, &geo_results))
            .await;

        let geo_results = geo_results.into_inner();
        summary.enriched_hosts = geo_results.len();
        geo_results
    }

    /// Fold the probed batch into the registry. Candidates the probe stage
    /// never reached are skipped for the run, and a malformed identifier
    /// excludes only that candidate from the batch.
    async fn upsert_batch(
        &self,
        candidates: &[NodeCandidate],
        probe_results: &HashMap<String, bool>,
        geo_results: &HashMap<String, GeoInfo>,
        summary: &mut RunSummary,
    ) {
        for candidate in candidates {
            let Some(reachable) = probe_results.get(&candidate.id).copied() else { continue };
            let geo = if reachable { geo_results.get(&candidate.host) } else { None };

            let outcome = self
                .registry
                .upsert(
                    &candidate.id,
                    &candidate.host,
                    candidate.port,
                    candidate.client_raw.clone(),
                    candidate.os_raw.clone(),
                    reachable,
                    geo,
                )
                .await;

            match outcome {
                Ok(UpsertOutcome::Created) => summary.created += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Ok(UpsertOutcome::Flagged) => summary.flagged += 1,
                Ok(UpsertOutcome::Skipped) => (),
                Err(e) => {
                    warn!(target: "pipeline::run", "Excluding candidate from batch: {}", e)
                }
            }
        }
    }

    /// Eviction and the optional unenriched-cleanup pass. Victims are
    /// detached from the graph before their records are removed; the ids
    /// are also returned so the rebuild stage can detach them again after
    /// taking its own lock.
    async fn maintenance(&self, summary: &mut RunSummary) -> Vec<String> {
        let mut victims = self.registry.evictable().await;
        summary.evicted = victims.len();

        if self.settings.purge_unenriched {
            let purged = self.registry.unenriched().await;
            summary.purged = purged.len();
            victims.extend(purged);
        }

        if victims.is_empty() {
            return victims
        }

        let mut graph = self.graph.lock().await;
        for id in &victims {
            graph.detach(id);
        }
        drop(graph);

        self.registry.remove_nodes(&victims).await;
        victims
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use smol::net::TcpListener;
    use tempdir::TempDir;

    use super::*;
    use crate::registry::NodeRegistry;

    struct StubSource {
        candidates: Vec<NodeCandidate>,
    }

    #[async_trait]
    impl DiscoverySource for StubSource {
        async fn fetch_candidates(&self) -> Result<Vec<NodeCandidate>> {
            Ok(self.candidates.clone())
        }
    }

    fn candidate(id: &str, port: u16, client: &str) -> NodeCandidate {
        NodeCandidate {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            client_raw: Some(client.to_string()),
            os_raw: Some("linux".to_string()),
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.probe_timeout = 1;
        settings.eviction_threshold = 2;
        settings
    }

    #[test]
    fn full_run_with_disabled_enrichment() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let open_port = listener.local_addr().unwrap().port();
            ex.spawn(async move {
                loop {
                    let _ = listener.accept().await;
                }
            })
            .detach();

            let closed_port = {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            let dir = TempDir::new("pipeline").unwrap();
            let registry = NodeRegistry::open(&dir.path().join("nodes.json"), 2).unwrap();
            let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));

            let source = StubSource {
                candidates: vec![
                    candidate("aa01", open_port, "geth/v1.13"),
                    candidate("bb02", open_port, "nethermind/1.20"),
                    candidate("cc03", closed_port, "geth/v1.12"),
                ],
            };

            let pipeline =
                Pipeline::new(settings(), Box::new(source), registry.clone(), graph.clone());
            let run_sub = pipeline.subscribe_runs().await;

            let summary = pipeline.run_once().await.unwrap();
            assert_eq!(summary.discovered, 3);
            assert_eq!(summary.probed, 3);
            assert_eq!(summary.reachable, 2);
            assert_eq!(summary.created, 2);
            assert_eq!(summary.enriched_hosts, 0);

            // Unknown unreachable candidate was not registered
            assert_eq!(registry.count().await, 2);
            assert_eq!(graph.lock().await.counts().leaf_edges, 2);
            assert_eq!(pipeline.state().await, PipelineState::Idle);

            // Subscribers got the same summary the run returned
            assert_eq!(run_sub.receive().await, summary);
            run_sub.unsubscribe().await;

            // A second identical run updates in place
            let summary = pipeline.run_once().await.unwrap();
            assert_eq!(summary.created, 0);
            assert_eq!(summary.updated, 2);
            assert_eq!(registry.count().await, 2);
            assert_eq!(graph.lock().await.counts().leaf_edges, 2);
        }));
    }

    #[test]
    fn repeated_failures_evict_and_detach() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let open_port = listener.local_addr().unwrap().port();

            let closed_port = {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            let dir = TempDir::new("pipeline").unwrap();
            let registry = NodeRegistry::open(&dir.path().join("nodes.json"), 2).unwrap();
            let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));

            // First run registers the node while it is reachable
            {
                let accept = listener.accept();
                let source =
                    StubSource { candidates: vec![candidate("aa01", open_port, "geth")] };
                let pipeline =
                    Pipeline::new(settings(), Box::new(source), registry.clone(), graph.clone());
                let run = pipeline.run_once();
                let (summary, _) = futures::join!(run, accept);
                assert_eq!(summary.unwrap().created, 1);
            }
            drop(listener);

            // Later runs see it unreachable until the threshold evicts it
            let source = StubSource { candidates: vec![candidate("aa01", closed_port, "geth")] };
            let pipeline =
                Pipeline::new(settings(), Box::new(source), registry.clone(), graph.clone());

            let summary = pipeline.run_once().await.unwrap();
            assert_eq!(summary.flagged, 1);
            assert_eq!(summary.evicted, 0);

            let summary = pipeline.run_once().await.unwrap();
            assert_eq!(summary.flagged, 1);
            assert_eq!(summary.evicted, 1);

            assert_eq!(registry.count().await, 0);
            assert_eq!(graph.lock().await.counts().leaf_edges, 0);
        }));
    }

    #[test]
    fn hung_stage_keeps_partial_results() {
        smol::block_on(async {
            let dir = TempDir::new("pipeline").unwrap();
            let registry = NodeRegistry::open(&dir.path().join("nodes.json"), 2).unwrap();
            let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));
            let source = StubSource { candidates: vec![] };

            let mut settings = settings();
            settings.stage_timeout = 1;
            let pipeline = Pipeline::new(settings, Box::new(source), registry, graph);

            // The stage writes one result and then never completes
            let results = Mutex::new(HashMap::new());
            pipeline
                .bounded_stage(PipelineState::Probing, async {
                    results.lock().await.insert("aa01".to_string(), true);
                    smol::future::pending::<()>().await;
                })
                .await;

            let results = results.into_inner();
            assert_eq!(results.len(), 1);
            assert_eq!(results.get("aa01"), Some(&true));
        });
    }

    #[test]
    fn purge_removes_stale_unenriched_records() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let open_port = listener.local_addr().unwrap().port();
            ex.spawn(async move {
                loop {
                    let _ = listener.accept().await;
                }
            })
            .detach();

            let dir = TempDir::new("pipeline").unwrap();
            let registry = NodeRegistry::open(&dir.path().join("nodes.json"), 2).unwrap();
            let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));

            let mut settings = settings();
            settings.purge_unenriched = true;

            // First run registers the node without enrichment
            {
                let source =
                    StubSource { candidates: vec![candidate("aa01", open_port, "geth")] };
                let pipeline = Pipeline::new(
                    settings.clone(),
                    Box::new(source),
                    registry.clone(),
                    graph.clone(),
                );
                assert_eq!(pipeline.run_once().await.unwrap().created, 1);
            }

            // The second run re-observes it still unenriched and also sees
            // a fresh candidate for the first time
            let source = StubSource {
                candidates: vec![
                    candidate("aa01", open_port, "geth"),
                    candidate("bb02", open_port, "besu"),
                ],
            };
            let pipeline =
                Pipeline::new(settings, Box::new(source), registry.clone(), graph.clone());
            let summary = pipeline.run_once().await.unwrap();

            assert_eq!(summary.created, 1);
            assert_eq!(summary.updated, 1);
            assert_eq!(summary.purged, 1);

            // The re-observed record is gone, the fresh one survives
            assert_eq!(registry.count().await, 1);
            assert!(registry.get("aa01").await.unwrap().is_none());
            assert!(registry.get("bb02").await.unwrap().is_some());
            assert_eq!(graph.lock().await.counts().leaf_edges, 1);
        }));
    }

    #[test]
    fn busy_pipeline_rejects_second_run() {
        smol::block_on(async {
            let dir = TempDir::new("pipeline").unwrap();
            let registry = NodeRegistry::open(&dir.path().join("nodes.json"), 2).unwrap();
            let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));
            let source = StubSource { candidates: vec![] };
            let pipeline = Pipeline::new(settings(), Box::new(source), registry, graph);

            *pipeline.state.lock().await = PipelineState::Probing;
            assert!(matches!(pipeline.run_once().await, Err(Error::PipelineBusy)));

            *pipeline.state.lock().await = PipelineState::Idle;
            assert!(pipeline.run_once().await.is_ok());
        });
    }
}
