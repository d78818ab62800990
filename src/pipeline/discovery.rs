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

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};
use tinyjson::JsonValue;

use super::settings::Settings;
use crate::{system::sleep, Error, Result};

// Listing providers block the default HTTP client agent
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// A candidate node tuple produced by a discovery source.
#[derive(Clone, Debug)]
pub struct NodeCandidate {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub client_raw: Option<String>,
    pub os_raw: Option<String>,
}

/// Injectable boundary producing candidate nodes for a pipeline run.
/// Duplicates in the output are tolerated, registry upserts are
/// idempotent per identifier.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn fetch_candidates(&self) -> Result<Vec<NodeCandidate>>;
}

/// Discovery against a paged JSON listing endpoint.
pub struct HttpDiscovery {
    endpoint: String,
    pages: usize,
    retry_limit: usize,
    retry_pause: u64,
}

impl HttpDiscovery {
    pub fn new(settings: &Settings) -> Self {
        Self {
            endpoint: settings.discovery_endpoint.clone(),
            pages: settings.discovery_pages,
            retry_limit: settings.discovery_retry_limit,
            retry_pause: settings.discovery_retry_pause,
        }
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<NodeCandidate>> {
        let url = self.endpoint.replace("{page}", &page.to_string());

        let mut last_err = String::new();
        for attempt in 1..=self.retry_limit {
            debug!(target: "pipeline::discovery", "Fetching {} (attempt {})", url, attempt);

            match surf::get(&url).header("User-Agent", USER_AGENT).await {
                Ok(mut rep) if rep.status().is_success() => {
                    let body = rep
                        .body_string()
                        .await
                        .map_err(|e| Error::DiscoveryFailed(e.to_string()))?;
                    let listing: JsonValue = body.parse()?;
                    return Ok(parse_candidates(&listing))
                }
                Ok(rep) => last_err = format!("HTTP status {}", rep.status()),
                Err(e) => last_err = e.to_string(),
            }

            if attempt < self.retry_limit {
                sleep(self.retry_pause).await;
            }
        }

        Err(Error::DiscoveryFailed(format!("{}: {}", url, last_err)))
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscovery {
    async fn fetch_candidates(&self) -> Result<Vec<NodeCandidate>> {
        let mut candidates = vec![];

        for page in 1..=self.pages {
            candidates.extend(self.fetch_page(page).await?);
        }

        Ok(candidates)
    }
}

/// Parse a listing page into candidate tuples. Malformed rows are skipped
/// with a warning rather than failing the page.
pub fn parse_candidates(listing: &JsonValue) -> Vec<NodeCandidate> {
    let Some(rows) = listing.get::<Vec<JsonValue>>() else {
        warn!(target: "pipeline::discovery", "Listing page is not an array");
        return vec![]
    };

    let mut candidates = vec![];

    for row in rows {
        let Some(map) = row.get::<HashMap<String, JsonValue>>() else {
            warn!(target: "pipeline::discovery", "Skipping non-object listing row");
            continue
        };

        let get_str = |key: &str| match map.get(key) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        // Some listing variants serialize the port as a string
        let port = match map.get("port") {
            Some(JsonValue::Number(n)) if (1.0..=65535.0).contains(n) => *n as u16,
            Some(JsonValue::String(s)) => match s.parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => {
                    warn!(target: "pipeline::discovery", "Skipping row with bad port {:?}", s);
                    continue
                }
            },
            _ => {
                warn!(target: "pipeline::discovery", "Skipping row without a valid port");
                continue
            }
        };

        let (Some(id), Some(host)) = (get_str("id"), get_str("host")) else {
            warn!(target: "pipeline::discovery", "Skipping row without id/host");
            continue
        };

        candidates.push(NodeCandidate {
            id,
            host,
            port,
            client_raw: get_str("client"),
            os_raw: get_str("os"),
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_rows_and_skips_broken_ones() {
        let listing: JsonValue = r#"[
            {"id": "aa01", "host": "203.0.113.7", "port": 30303, "client": "Geth/v1.13", "os": "linux"},
            {"id": "bb02", "host": "203.0.113.8", "port": "30304"},
            {"id": "cc03", "host": "203.0.113.9"},
            {"id": "dd04", "port": 30303},
            "not-an-object",
            {"id": "ee05", "host": "203.0.113.10", "port": 99999999}
        ]"#
        .parse()
        .unwrap();

        let candidates = parse_candidates(&listing);
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].id, "aa01");
        assert_eq!(candidates[0].port, 30303);
        assert_eq!(candidates[0].client_raw.as_deref(), Some("Geth/v1.13"));

        assert_eq!(candidates[1].id, "bb02");
        assert_eq!(candidates[1].port, 30304);
        assert!(candidates[1].client_raw.is_none());
    }

    #[test]
    fn non_array_listing_yields_nothing() {
        let listing: JsonValue = r#"{"error": "rate limited"}"#.parse().unwrap();
        assert!(parse_candidates(&listing).is_empty());
    }
}
