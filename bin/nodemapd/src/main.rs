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

use std::{collections::HashSet, path::Path, sync::Arc};

use futures::FutureExt;
use log::{error, info, warn};
use smol::{lock::Mutex, Executor};
use structopt::StructOpt;
use structopt_toml::StructOptToml;
use url::Url;

use nodemap::{
    async_daemonize, cli_desc,
    pipeline::{GraphPtr, HttpDiscovery, Pipeline, PipelinePtr, Settings, SettingsOpt},
    registry::{NodeRegistry, NodeRegistryPtr},
    rpc::server::{listen_and_serve, RequestHandler},
    system::{sleep, StoppableTask, StoppableTaskPtr},
    taxonomy::TaxonomyGraph,
    util::path::expand_path,
    Error, Result,
};

/// JSON-RPC request handlers
mod rpc;

#[cfg(test)]
mod test_utils;

const CONFIG_FILE: &str = "nodemapd_config.toml";
const CONFIG_FILE_CONTENTS: &str = include_str!("../nodemapd_config.toml");

#[derive(Clone, Debug, serde::Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "nodemapd", about = cli_desc!())]
struct Args {
    #[structopt(long, default_value = "tcp://127.0.0.1:24330")]
    /// JSON-RPC listen URL
    pub rpc_listen: Url,

    #[structopt(long, default_value = "~/.local/share/nodemap/nodes.json")]
    /// Path to the node registry snapshot
    pub nodes_db: String,

    #[structopt(flatten)]
    /// Pipeline settings
    pub pipeline: SettingsOpt,

    #[structopt(short, long)]
    /// Configuration file to use
    pub config: Option<String>,

    #[structopt(short, long)]
    /// Set log file to output into
    pub log: Option<String>,

    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    pub verbose: u8,
}

/// Struct representing the daemon
pub struct Nodemapd {
    /// Node registry handle
    pub registry: NodeRegistryPtr,
    /// Derived taxonomy graph
    pub graph: GraphPtr,
    /// Pipeline orchestrator
    pub pipeline: PipelinePtr,
    /// Channel endpoints used to schedule an immediate pipeline run
    trigger_tx: smol::channel::Sender<()>,
    trigger_rx: smol::channel::Receiver<()>,
    /// JSON-RPC connection tracker
    pub rpc_connections: Mutex<HashSet<StoppableTaskPtr>>,
}

impl Nodemapd {
    pub fn new(settings: Settings, nodes_db: &Path) -> Result<Arc<Self>> {
        let registry = NodeRegistry::open(nodes_db, settings.eviction_threshold)?;
        let graph: GraphPtr = Arc::new(Mutex::new(TaxonomyGraph::new()));

        let source = HttpDiscovery::new(&settings);
        let pipeline = Pipeline::new(settings, Box::new(source), registry.clone(), graph.clone());

        let (trigger_tx, trigger_rx) = smol::channel::unbounded();

        Ok(Arc::new(Self {
            registry,
            graph,
            pipeline,
            trigger_tx,
            trigger_rx,
            rpc_connections: Mutex::new(HashSet::new()),
        }))
    }
}

/// Run the pipeline immediately at startup and then on every interval
/// tick or explicit trigger, whichever comes first.
async fn run_scheduler(node: Arc<Nodemapd>, interval: u64) -> Result<()> {
    loop {
        if let Err(e) = node.pipeline.run_once().await {
            warn!(target: "nodemapd", "Pipeline run failed: {}", e);
        }

        let tick = sleep(interval).fuse();
        let trigger = node.trigger_rx.recv().fuse();
        futures::pin_mut!(tick, trigger);

        futures::select! {
            _ = tick => (),
            r = trigger => {
                r?;
                info!(target: "nodemapd", "Pipeline run triggered over RPC");
            }
        }
    }
}

async_daemonize!(realmain);
async fn realmain(args: Args, ex: Arc<Executor<'static>>) -> Result<()> {
    let settings: Settings = args.pipeline.into();
    let run_interval = settings.run_interval;

    let nodes_db = expand_path(&args.nodes_db)?;
    if let Some(parent) = nodes_db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let nodemapd = Nodemapd::new(settings, &nodes_db)?;

    // JSON-RPC server
    info!(target: "nodemapd", "Starting JSON-RPC server on {}", args.rpc_listen);
    let nodemapd_ = nodemapd.clone();
    let rpc_task = StoppableTask::new();
    rpc_task.clone().start(
        listen_and_serve(args.rpc_listen, nodemapd.clone(), ex.clone()),
        |res| async move {
            match res {
                Ok(()) | Err(Error::RpcServerStopped) => nodemapd_.stop_connections().await,
                Err(e) => error!(target: "nodemapd", "Failed starting JSON-RPC server: {}", e),
            }
        },
        Error::RpcServerStopped,
        ex.clone(),
    );

    // Periodic pipeline runs
    info!(target: "nodemapd", "Starting pipeline scheduler with a {}s interval", run_interval);
    let scheduler_task = StoppableTask::new();
    scheduler_task.clone().start(
        run_scheduler(nodemapd.clone(), run_interval),
        |res| async move {
            match res {
                Ok(()) | Err(Error::DetachedTaskStopped) => { /* Do nothing */ }
                Err(e) => error!(target: "nodemapd", "Pipeline scheduler terminated: {}", e),
            }
        },
        Error::DetachedTaskStopped,
        ex.clone(),
    );

    // Signal handling for graceful termination.
    let (signals_handler, signals_task) = SignalHandler::new(ex)?;
    signals_handler.wait_termination(signals_task).await?;
    info!(target: "nodemapd", "Caught termination signal, cleaning up and exiting...");

    info!(target: "nodemapd", "Stopping JSON-RPC server...");
    rpc_task.stop().await;

    info!(target: "nodemapd", "Stopping pipeline scheduler...");
    scheduler_task.stop().await;

    info!(target: "nodemapd", "Saving registry snapshot...");
    nodemapd.registry.save().await?;

    info!(target: "nodemapd", "Bye!");
    Ok(())
}
