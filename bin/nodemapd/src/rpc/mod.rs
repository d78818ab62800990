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

use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use smol::lock::MutexGuard;
use tinyjson::JsonValue;

use nodemap::{
    rpc::{
        jsonrpc::{ErrorCode, JsonError, JsonRequest, JsonResult},
        server::RequestHandler,
    },
    system::StoppableTaskPtr,
};

use crate::Nodemapd;

/// RPC handlers for registry queries
pub mod nodes;

/// RPC handlers for aggregate statistics
pub mod statistics;

/// RPC handlers for taxonomy graph queries
pub mod graph;

/// RPC handlers for pipeline control
pub mod pipeline;

/// Custom RPC server error for a pipeline that is mid-run
pub const ERROR_CODE_PIPELINE_BUSY: i32 = -32110;

/// Extract the positional parameters of a request, enforcing an exact
/// arity. Handlers then validate individual parameter types themselves.
fn expect_params(params: &JsonValue, n: usize, id: u16) -> Result<&Vec<JsonValue>, JsonError> {
    match params.get::<Vec<JsonValue>>() {
        Some(params) if params.len() == n => Ok(params),
        _ => Err(JsonError::new(
            ErrorCode::InvalidParams,
            Some(format!("Expected {} parameter(s)", n)),
            id,
        )),
    }
}

fn param_str<'a>(params: &'a [JsonValue], index: usize, id: u16) -> Result<&'a String, JsonError> {
    params[index].get::<String>().ok_or_else(|| {
        JsonError::new(
            ErrorCode::InvalidParams,
            Some(format!("Parameter {} must be a string", index)),
            id,
        )
    })
}

#[async_trait]
impl RequestHandler for Nodemapd {
    async fn handle_request(&self, req: JsonRequest) -> JsonResult {
        debug!(target: "nodemapd::rpc", "--> {}", req.stringify().unwrap_or_default());

        match req.method.as_str() {
            // =====================
            // Miscellaneous methods
            // =====================
            "ping" => self.pong(req.id, req.params).await,

            // ================
            // Registry queries
            // ================
            "nodes.list_nodes" => self.nodes_list_nodes(req.id, req.params).await,
            "nodes.get_node" => self.nodes_get_node(req.id, req.params).await,
            "nodes.get_latest_nodes" => self.nodes_get_latest_nodes(req.id, req.params).await,
            "nodes.filter_nodes" => self.nodes_filter_nodes(req.id, req.params).await,
            "nodes.get_distinct_values" => {
                self.nodes_get_distinct_values(req.id, req.params).await
            }
            "nodes.get_node_count" => self.nodes_get_node_count(req.id, req.params).await,

            // ==================
            // Statistics methods
            // ==================
            "statistics.get_taxonomy_statistics" => {
                self.statistics_get_taxonomy_statistics(req.id, req.params).await
            }

            // =============
            // Graph methods
            // =============
            "graph.get_country_nodes" => self.graph_get_country_nodes(req.id, req.params).await,
            "graph.get_graph_counts" => self.graph_get_graph_counts(req.id, req.params).await,

            // ================
            // Pipeline methods
            // ================
            "pipeline.get_status" => self.pipeline_get_status(req.id, req.params).await,
            "pipeline.trigger_run" => self.pipeline_trigger_run(req.id, req.params).await,

            // ==============
            // Invalid method
            // ==============
            _ => JsonError::new(ErrorCode::MethodNotFound, None, req.id).into(),
        }
    }

    async fn connections_mut(&self) -> MutexGuard<'_, HashSet<StoppableTaskPtr>> {
        self.rpc_connections.lock().await
    }
}
