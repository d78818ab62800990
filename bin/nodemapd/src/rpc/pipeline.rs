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
    pipeline::PipelineState,
    rpc::jsonrpc::{ErrorCode, JsonError, JsonResponse, JsonResult},
};

use super::{expect_params, ERROR_CODE_PIPELINE_BUSY};
use crate::Nodemapd;

impl Nodemapd {
    // RPCAPI:
    // Returns the current orchestrator stage name.
    //
    // --> {"jsonrpc": "2.0", "method": "pipeline.get_status", "params": [], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": "idle", "id": 1}
    pub async fn pipeline_get_status(&self, id: u16, params: JsonValue) -> JsonResult {
        if let Err(e) = expect_params(&params, 0, id) {
            return e.into()
        }

        let state = self.pipeline.state().await;
        JsonResponse::new(JsonValue::String(state.name().to_string()), id).into()
    }

    // RPCAPI:
    // Schedules an immediate pipeline run. The run goes through the
    // regular staging, so a pipeline that is already mid-run rejects the
    // trigger with a server error.
    //
    // --> {"jsonrpc": "2.0", "method": "pipeline.trigger_run", "params": [], "id": 1}
    // <-- {"jsonrpc": "2.0", "result": true, "id": 1}
    pub async fn pipeline_trigger_run(&self, id: u16, params: JsonValue) -> JsonResult {
        if let Err(e) = expect_params(&params, 0, id) {
            return e.into()
        }

        if self.pipeline.state().await != PipelineState::Idle {
            return JsonError::new(
                ErrorCode::ServerError(ERROR_CODE_PIPELINE_BUSY),
                Some("A pipeline run is already in progress".to_string()),
                id,
            )
            .into()
        }

        if let Err(e) = self.trigger_tx.send(()).await {
            return JsonError::new(ErrorCode::InternalError, Some(e.to_string()), id).into()
        }

        JsonResponse::new(JsonValue::Boolean(true), id).into()
    }
}
