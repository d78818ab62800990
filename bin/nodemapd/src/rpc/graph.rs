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

use tinyjson::JsonValue;

use nodemap::rpc::{
    jsonrpc::{JsonResponse, JsonResult},
    util::{json_map, json_str},
};

use super::{expect_params, param_str};
use crate::Nodemapd;

impl Nodemapd {
    // RPCAPI:
    // Returns the identifiers of all nodes reached by traversing the
    // taxonomy graph from the root through the given country node.
    // Unknown countries yield an empty list.
    //
    // --> {"jsonrpc": "2.0", "method": "graph.get_country_nodes", "params": ["Germany"], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": ["aa01", "bb02"], "id": 1}
    pub async fn graph_get_country_nodes(&self, id: u16, params: JsonValue) -> JsonResult {
        let params = match expect_params(&params, 1, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let country = match param_str(params, 0, id) {
            Ok(country) => country,
            Err(e) => return e.into(),
        };

        let ids = self.graph.lock().await.country_nodes(country);
        JsonResponse::new(JsonValue::Array(ids.iter().map(|i| json_str(i)).collect()), id).into()
    }

    // RPCAPI:
    // Returns the taxonomy graph sizes: the number of category nodes
    // (root included) and the number of leaf edges to node identifiers.
    //
    // --> {"jsonrpc": "2.0", "method": "graph.get_graph_counts", "params": [], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": {"category_nodes": 5, "leaf_edges": 3}, "id": 1}
    pub async fn graph_get_graph_counts(&self, id: u16, params: JsonValue) -> JsonResult {
        if let Err(e) = expect_params(&params, 0, id) {
            return e.into()
        }

        let counts = self.graph.lock().await.counts();
        let json = json_map([
            ("category_nodes", JsonValue::Number(counts.category_nodes as f64)),
            ("leaf_edges", JsonValue::Number(counts.leaf_edges as f64)),
        ]);

        JsonResponse::new(json, id).into()
    }
}
