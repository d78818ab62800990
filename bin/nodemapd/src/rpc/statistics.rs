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
    rpc::{
        jsonrpc::{ErrorCode, JsonError, JsonResponse, JsonResult},
        util::{json_map, json_str},
    },
    taxonomy::{aggregate, Taxonomy},
};

use super::{expect_params, param_str};
use crate::Nodemapd;

impl Nodemapd {
    // RPCAPI:
    // Returns category counts and percentages over the registry for the
    // given taxonomy (client, os, isp or country). An empty registry
    // yields an empty row list.
    //
    // --> {"jsonrpc": "2.0", "method": "statistics.get_taxonomy_statistics", "params": ["isp"], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": [{"category": "AWS", "count": 2, "percentage": 66.67}], "id": 1}
    pub async fn statistics_get_taxonomy_statistics(
        &self,
        id: u16,
        params: JsonValue,
    ) -> JsonResult {
        let params = match expect_params(&params, 1, id) {
            Ok(params) => params,
            Err(e) => return e.into(),
        };
        let taxonomy = match param_str(params, 0, id) {
            Ok(taxonomy) => taxonomy,
            Err(e) => return e.into(),
        };

        let taxonomy: Taxonomy = match taxonomy.parse() {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                return JsonError::new(ErrorCode::InvalidParams, Some(e.to_string()), id).into()
            }
        };

        let snapshot = self.registry.snapshot().await;
        let rows = aggregate(taxonomy, &snapshot)
            .into_iter()
            .map(|row| {
                json_map([
                    ("category", json_str(&row.category)),
                    ("count", JsonValue::Number(row.count as f64)),
                    ("percentage", JsonValue::Number(row.percentage)),
                ])
            })
            .collect();

        JsonResponse::new(JsonValue::Array(rows), id).into()
    }
}

#[cfg(test)]
mod tests {
    use tinyjson::JsonValue;

    use nodemap::rpc::jsonrpc::ErrorCode;

    use crate::test_utils::{setup, validate_invalid_rpc_parameter};

    #[test]
    fn test_unknown_taxonomy_is_rejected() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_invalid_rpc_parameter(
                &nodemapd,
                "statistics.get_taxonomy_statistics",
                &[JsonValue::String("flavour".to_string())],
                ErrorCode::InvalidParams.code(),
            )
            .await;
        });
    }

    #[test]
    fn test_missing_taxonomy_is_rejected() {
        smol::block_on(async {
            let nodemapd = setup();
            validate_invalid_rpc_parameter(
                &nodemapd,
                "statistics.get_taxonomy_statistics",
                &[],
                ErrorCode::InvalidParams.code(),
            )
            .await;
        });
    }
}
