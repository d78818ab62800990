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

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tempdir::TempDir;
use tinyjson::JsonValue;

use nodemap::{
    pipeline::Settings,
    rpc::{
        jsonrpc::{ErrorCode, JsonRequest, JsonResult},
        server::RequestHandler,
    },
};

use crate::Nodemapd;

// Defines a global `Nodemapd` instance shared across all tests. The
// TempDir backing the registry snapshot is kept alive alongside it.
lazy_static! {
    static ref NODEMAPD_INSTANCE: Mutex<Option<(Arc<Nodemapd>, Arc<TempDir>)>> = Mutex::new(None);
}

/// Initializes logging for test cases, configured from the provided log
/// level and a list of targets to ignore.
pub fn init_logger(log_level: simplelog::LevelFilter, ignore_targets: Vec<&str>) {
    let mut cfg = simplelog::ConfigBuilder::new();

    for target in ignore_targets {
        cfg.add_filter_ignore(target.to_string());
    }
    cfg.set_target_level(log_level);

    if simplelog::TermLogger::init(
        log_level,
        cfg.build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("Logger failed to initialize");
    }
}

/// Sets up the `Nodemapd` instance for testing, ensuring a single
/// instance is initialized once and shared among subsequent setup calls.
/// Tests seed the shared registry with unique node identifiers so they do
/// not interfere with each other.
pub fn setup() -> Arc<Nodemapd> {
    let mut instance = NODEMAPD_INSTANCE.lock().expect("Failed to lock NODEMAPD_INSTANCE mutex");

    if instance.is_none() {
        init_logger(simplelog::LevelFilter::Off, vec!["async_io", "polling"]);

        let temp_dir = TempDir::new("nodemapd").expect("Failed to create temp dir");
        let nodes_db = temp_dir.path().join("nodes.json");

        // Enrichment stays disabled since the default API key is empty
        let nodemapd = Nodemapd::new(Settings::default(), &nodes_db)
            .expect("Failed to initialize Nodemapd instance");

        *instance = Some((nodemapd, Arc::new(temp_dir)));
    }

    Arc::clone(&instance.as_ref().unwrap().0)
}

/// Auxiliary function that validates the handling of an invalid JSON-RPC
/// parameter: sends a request with the provided method and params through
/// [`Nodemapd::handle_request`] and verifies the response is an error
/// with the expected code.
pub async fn validate_invalid_rpc_parameter(
    nodemapd: &Nodemapd,
    method_name: &str,
    params: &[JsonValue],
    expected_error_code: i32,
) {
    let request = JsonRequest {
        id: 1,
        jsonrpc: "2.0",
        method: method_name.to_string(),
        params: JsonValue::Array(params.to_vec()),
    };

    let response = nodemapd.handle_request(request).await;

    match response {
        JsonResult::Error(err) => {
            assert_eq!(err.error.code, expected_error_code);
        }
        _ => panic!("Expected a JsonError for method {}", method_name),
    }
}

/// Auxiliary function that validates that a method taking no parameters
/// rejects a request carrying one.
pub async fn validate_empty_rpc_parameters(nodemapd: &Nodemapd, method_name: &str) {
    validate_invalid_rpc_parameter(
        nodemapd,
        method_name,
        &[JsonValue::String("unexpected".to_string())],
        ErrorCode::InvalidParams.code(),
    )
    .await;
}
