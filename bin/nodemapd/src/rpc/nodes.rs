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

use nodemap::{
    registry::{FilterField, NodeRecord},
    rpc::jsonrpc::{ErrorCode, JsonError, JsonResponse, JsonResult},
};

use super::{expect_params, param_str};
use crate::Nodemapd;

fn records_to_json(records: &[NodeRecord]) -> JsonValue {
    JsonValue::Array(records.iter().map(|r| r.to_json()).collect())
}

impl Nodemapd {
    // RPCAPI:
    // Returns all registered node records.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.list_nodes", "params": [], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": [{"id": "aa01", "host": "203.0.113.7", ...}], "id": 1}
    pub async fn nodes_list_nodes(&self, id: u16, params: JsonValue) -> JsonResult {
        if let Err(e) = expect_params(&params, 0, id) {
            return e.into()
        }

        let records = self.registry.snapshot().await;
        JsonResponse::new(records_to_json(&records), id).into()
    }

    // RPCAPI:
    // Returns the node record with the given identifier, or `null` if the
    // registry does not contain it.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.get_node", "params": ["aa01"], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": {"id": "aa01", "host": "203.0.113.7", ...}, "id": 1}
    pub async fn nodes_get_node(&self, id: u16, params: JsonValue) -> JsonResult {
        let params = match expect_params(&params, 1, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let node_id = match param_str(params, 0, id) {
            Ok(node_id) => node_id,
            Err(e) => return e.into(),
        };

        match self.registry.get(node_id).await {
            Ok(Some(record)) => JsonResponse::new(record.to_json(), id).into(),
            Ok(None) => JsonResponse::new(JsonValue::Null, id).into(),
            Err(e) => JsonError::new(ErrorCode::InvalidParams, Some(e.to_string()), id).into(),
        }
    }

    // RPCAPI:
    // Returns up to `n` most recently created node records, newest first.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.get_latest_nodes", "params": [10], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": [{"id": "aa01", ...}], "id": 1}
    pub async fn nodes_get_latest_nodes(&self, id: u16, params: JsonValue) -> JsonResult {
        let params = match expect_params(&params, 1, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let Some(n) = params[0].get::<f64>().filter(|n| **n >= 0.0) else {
            return JsonError::new(
                ErrorCode::InvalidParams,
                Some("Parameter 0 must be a non-negative number".to_string()),
                id,
            )
            .into()
        };

        let records = self.registry.latest(*n as usize).await;
        JsonResponse::new(records_to_json(&records), id).into()
    }

    // RPCAPI:
    // Returns node records whose field equals the given value, compared
    // case-insensitively. Valid fields are client, os, isp and country.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.filter_nodes", "params": ["country", "Germany"], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": [{"id": "aa01", ...}], "id": 1}
    pub async fn nodes_filter_nodes(&self, id: u16, params: JsonValue) -> JsonResult {
        let params = match expect_params(&params, 2, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let (field, value) = match (param_str(params, 0, id), param_str(params, 1, id)) {
            (Ok(field), Ok(value)) => (field, value),
            (Err(e), _) | (_, Err(e)) => return e.into(),
        };

        let field: FilterField = match field.parse() {
            Ok(field) => field,
            Err(e) => {
                return JsonError::new(ErrorCode::InvalidParams, Some(e.to_string()), id).into()
            }
        };

        let records = self.registry.filter_by(field, value).await;
        JsonResponse::new(records_to_json(&records), id).into()
    }

    // RPCAPI:
    // Returns the sorted distinct non-null values of the given field
    // across the registry. Valid fields are client, os, isp and country.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.get_distinct_values", "params": ["country"], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": ["Finland", "Germany"], "id": 1}
    pub async fn nodes_get_distinct_values(&self, id: u16, params: JsonValue) -> JsonResult {
        let params = match expect_params(&params, 1, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let field = match param_str(params, 0, id) {
            Ok(field) => field,
            Err(e) => return e.into(),
        };

        let field: FilterField = match field.parse() {
            Ok(field) => field,
            Err(e) => {
                return JsonError::new(ErrorCode::InvalidParams, Some(e.to_string()), id).into()
            }
        };

        let values =
            self.registry.distinct(field).await.into_iter().map(JsonValue::String).collect();
        JsonResponse::new(JsonValue::Array(values), id).into()
    }

    // RPCAPI:
    // Returns the number of registered nodes.
    //
    // --> {"jsonrpc": "2.0", "method": "nodes.get_node_count", "params": [], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": 42, "id": 1}
    pub async fn nodes_get_node_count(&self, id: u16, params: JsonValue) -> JsonResult {
        if let Err(e) = expect_params(&params, 0, id) {
            return e.into()
        }

        let count = self.registry.count().await;
        JsonResponse::new(JsonValue::Number(count as f64), id).into()
    }
}

#[cfg(test)]
mod tests {
    use tinyjson::JsonValue;

    use nodemap::rpc::{
        jsonrpc::{ErrorCode, JsonRequest, JsonResult},
        server::RequestHandler,
    };

    use crate::test_utils::{
        setup, validate_empty_rpc_parameters, validate_invalid_rpc_parameter,
    };

    fn request(method: &str, params: Vec<JsonValue>) -> JsonRequest {
        JsonRequest { jsonrpc: "2.0", id: 1, method: method.to_string(), params: JsonValue::Array(params) }
    }

    #[test]
    fn test_list_and_count_reject_extra_params() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_empty_rpc_parameters(&nodemapd, "nodes.list_nodes").await;
            validate_empty_rpc_parameters(&nodemapd, "nodes.get_node_count").await;
        });
    }

    #[test]
    fn test_get_node_rejects_malformed_id() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_invalid_rpc_parameter(
                &nodemapd,
                "nodes.get_node",
                &[JsonValue::String("not-hex!".to_string())],
                ErrorCode::InvalidParams.code(),
            )
            .await;
        });
    }

    #[test]
    fn test_get_node_roundtrip() {
        smol::block_on(async {
            let nodemapd = setup();
            nodemapd
                .registry
                .upsert("f00d01", "203.0.113.99", 30303, None, None, true, None)
                .await
                .unwrap();

            let rep = nodemapd
                .handle_request(request(
                    "nodes.get_node",
                    vec![JsonValue::String("f00d01".to_string())],
                ))
                .await;

            let JsonResult::Response(rep) = rep else { panic!("Expected a response") };
            let record = rep.result.get::<std::collections::HashMap<String, JsonValue>>().unwrap();
            assert_eq!(record["host"].get::<String>().unwrap(), "203.0.113.99");

            // Unknown but well-formed ids resolve to null
            let rep = nodemapd
                .handle_request(request(
                    "nodes.get_node",
                    vec![JsonValue::String("0bad0d".to_string())],
                ))
                .await;
            let JsonResult::Response(rep) = rep else { panic!("Expected a response") };
            assert!(matches!(rep.result, JsonValue::Null));
        });
    }

    #[test]
    fn test_filter_nodes_rejects_unknown_field() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_invalid_rpc_parameter(
                &nodemapd,
                "nodes.filter_nodes",
                &[
                    JsonValue::String("flavour".to_string()),
                    JsonValue::String("vanilla".to_string()),
                ],
                ErrorCode::InvalidParams.code(),
            )
            .await;
        });
    }

    #[test]
    fn test_get_latest_nodes_rejects_non_numeric_param() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_invalid_rpc_parameter(
                &nodemapd,
                "nodes.get_latest_nodes",
                &[JsonValue::String("ten".to_string())],
                ErrorCode::InvalidParams.code(),
            )
            .await;
        });
    }
}
