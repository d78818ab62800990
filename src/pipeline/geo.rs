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

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use futures::{stream::FuturesUnordered, StreamExt};
use log::{debug, warn};
use smol::lock::{Mutex, Semaphore};
use tinyjson::JsonValue;
use url::Url;

use super::settings::Settings;
use crate::{registry::GeoInfo, Error, Result};

const LOOKUP_FIELDS: &str = "latitude,longitude,isp,country_name";

/// Rate-limited geolocation/provider lookup client.
///
/// Lookup failures are never surfaced to the pipeline as errors: a failed
/// host simply has no result this run and keeps its prior geo fields.
/// After `geo_giveup_limit` transport failures within one batch the
/// remaining lookups are abandoned for the run.
pub struct GeoClient {
    endpoint: String,
    apikey: String,
    concurrency: usize,
    giveup_limit: usize,
}

impl GeoClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            endpoint: settings.geo_endpoint.clone(),
            apikey: settings.geo_apikey.clone(),
            concurrency: settings.geo_concurrency.max(1),
            giveup_limit: settings.geo_giveup_limit,
        }
    }

    /// Enrichment is disabled for deployments without a provider API key.
    pub fn enabled(&self) -> bool {
        !self.apikey.is_empty()
    }

    /// One provider call. `Err` means a transport failure (counts toward
    /// the per-run give-up limit), `Ok(None)` means the provider had no
    /// usable answer for this host.
    async fn call(&self, host: &str) -> Result<Option<GeoInfo>> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[("apiKey", self.apikey.as_str()), ("ip", host), ("fields", LOOKUP_FIELDS)],
        )?;

        let mut rep = surf::get(url.as_str())
            .await
            .map_err(|e| Error::Custom(format!("Geo lookup transport failure: {}", e)))?;

        if !rep.status().is_success() {
            debug!(target: "pipeline::geo", "Lookup for {} returned status {}", host, rep.status());
            return Ok(None)
        }

        let body = rep
            .body_string()
            .await
            .map_err(|e| Error::Custom(format!("Geo lookup transport failure: {}", e)))?;

        Ok(body.parse::<JsonValue>().ok().as_ref().and_then(parse_geo))
    }

    /// Look up all given hosts with a bounded worker pool, writing results
    /// into the shared per-host map. Hosts are expected to be deduplicated
    /// by the caller so each costs at most one provider call per run.
    pub async fn enrich_batch(&self, hosts: &[String], results: &Mutex<HashMap<String, GeoInfo>>) {
        let semaphore = Semaphore::new(self.concurrency);
        let transport_failures = AtomicUsize::new(0);

        let mut lookups = FuturesUnordered::new();
        for host in hosts {
            let semaphore = &semaphore;
            let transport_failures = &transport_failures;
            lookups.push(async move {
                let _permit = semaphore.acquire().await;

                if transport_failures.load(Ordering::SeqCst) >= self.giveup_limit {
                    return
                }

                match self.call(host).await {
                    Ok(Some(geo)) => {
                        results.lock().await.insert(host.clone(), geo);
                    }
                    Ok(None) => (),
                    Err(e) => {
                        warn!(target: "pipeline::geo", "Lookup for {} failed: {}", host, e);
                        let failures = transport_failures.fetch_add(1, Ordering::SeqCst) + 1;
                        if failures == self.giveup_limit {
                            warn!(
                                target: "pipeline::geo",
                                "{} transport failures, abandoning enrichment for this run",
                                failures
                            );
                        }
                    }
                }
            });
        }

        while lookups.next().await.is_some() {}
    }
}

/// Extract a complete [`GeoInfo`] from a provider response. The provider
/// serializes coordinates as numbers or numeric strings depending on the
/// plan; anything incomplete yields no result.
pub fn parse_geo(value: &JsonValue) -> Option<GeoInfo> {
    let map = value.get::<HashMap<String, JsonValue>>()?;

    let coord = |key: &str| -> Option<f64> {
        match map.get(key) {
            Some(JsonValue::Number(n)) => Some(*n),
            Some(JsonValue::String(s)) => s.parse().ok(),
            _ => None,
        }
    };
    let field = |key: &str| -> Option<String> {
        match map.get(key) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    };

    Some(GeoInfo {
        latitude: coord("latitude")?,
        longitude: coord("longitude")?,
        isp: field("isp")?,
        country: field("country_name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_string_coordinates() {
        let rep: JsonValue = r#"{
            "latitude": "50.11090",
            "longitude": "8.68213",
            "isp": "Hetzner Online GmbH",
            "country_name": "Germany"
        }"#
        .parse()
        .unwrap();

        let geo = parse_geo(&rep).unwrap();
        assert_eq!(geo.latitude, 50.1109);
        assert_eq!(geo.isp, "Hetzner Online GmbH");
        assert_eq!(geo.country, "Germany");
    }

    #[test]
    fn incomplete_response_yields_no_result() {
        let rep: JsonValue = r#"{"latitude": 50.11, "isp": "Hetzner"}"#.parse().unwrap();
        assert!(parse_geo(&rep).is_none());

        let rep: JsonValue = r#"{"message": "invalid api key"}"#.parse().unwrap();
        assert!(parse_geo(&rep).is_none());
    }

    #[test]
    fn transport_failures_abandon_the_batch() {
        smol::block_on(async {
            // Bind and drop so connections to the endpoint are refused
            let closed_port = {
                let l = smol::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            let mut settings = Settings::default();
            settings.geo_endpoint = format!("http://127.0.0.1:{}/ipgeo", closed_port);
            settings.geo_apikey = "k".to_string();
            // Sequential lookups make the failure counter deterministic
            settings.geo_concurrency = 1;
            settings.geo_giveup_limit = 2;

            let hosts: Vec<String> = (1..=6).map(|i| format!("203.0.113.{}", i)).collect();
            let results = Mutex::new(HashMap::new());
            GeoClient::new(&settings).enrich_batch(&hosts, &results).await;

            // Two refused connections hit the limit, the rest are skipped
            assert!(results.lock().await.is_empty());
        });
    }

    #[test]
    fn empty_apikey_disables_enrichment() {
        let mut settings = Settings::default();
        assert!(!GeoClient::new(&settings).enabled());

        settings.geo_apikey = "k".to_string();
        assert!(GeoClient::new(&settings).enabled());
    }
}
