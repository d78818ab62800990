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

/// Pipeline tunables. The scope of this is a single orchestrator instance
/// configured by the daemon.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Discovery listing endpoint; `{page}` is substituted per page
    pub discovery_endpoint: String,
    /// Number of listing pages to fetch per run
    pub discovery_pages: usize,
    /// Attempts per listing page before the fetch fails
    pub discovery_retry_limit: usize,
    /// Pause between listing page attempts (in seconds)
    pub discovery_retry_pause: u64,
    /// TCP liveness probe timeout (in seconds)
    pub probe_timeout: u64,
    /// Probe worker pool size
    pub probe_concurrency: usize,
    /// Geolocation lookup endpoint
    pub geo_endpoint: String,
    /// Geolocation provider API key, empty disables enrichment
    pub geo_apikey: String,
    /// Enrichment worker pool size
    pub geo_concurrency: usize,
    /// Transport failures after which enrichment is abandoned for the run
    pub geo_giveup_limit: usize,
    /// Failed liveness checks before a record is evicted
    pub eviction_threshold: u64,
    /// Interval between scheduled pipeline runs (in seconds)
    pub run_interval: u64,
    /// Per-stage timeout (in seconds), 0 disables
    pub stage_timeout: u64,
    /// Remove records that were re-observed but never enriched
    pub purge_unenriched: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discovery_endpoint: "https://etherscan.io/nodetracker/nodes-data?p={page}".to_string(),
            discovery_pages: 1,
            discovery_retry_limit: 5,
            discovery_retry_pause: 2,
            probe_timeout: 3,
            probe_concurrency: 32,
            geo_endpoint: "https://api.ipgeolocation.io/ipgeo".to_string(),
            geo_apikey: String::new(),
            geo_concurrency: 4,
            geo_giveup_limit: 10,
            eviction_threshold: 24,
            run_interval: 3600,
            stage_timeout: 600,
            purge_unenriched: false,
        }
    }
}

// The following is used so we can have pipeline settings configurable
// from TOML files.

use structopt::StructOpt;

/// Defines the pipeline settings.
#[derive(Clone, Debug, serde::Deserialize, structopt::StructOpt, structopt_toml::StructOptToml)]
#[structopt()]
pub struct SettingsOpt {
    /// Discovery listing endpoint, {page} substituted per page
    #[structopt(long)]
    pub discovery_endpoint: Option<String>,

    /// Number of listing pages to fetch per run
    #[structopt(long)]
    pub discovery_pages: Option<usize>,

    /// Attempts per listing page before the fetch fails
    #[structopt(skip)]
    pub discovery_retry_limit: Option<usize>,

    /// Pause between listing page attempts in seconds
    #[structopt(skip)]
    pub discovery_retry_pause: Option<u64>,

    /// TCP liveness probe timeout in seconds
    #[structopt(long)]
    pub probe_timeout: Option<u64>,

    /// Probe worker pool size
    #[structopt(long)]
    pub probe_concurrency: Option<usize>,

    /// Geolocation lookup endpoint
    #[structopt(skip)]
    pub geo_endpoint: Option<String>,

    /// Geolocation provider API key, empty disables enrichment
    #[structopt(long)]
    pub geo_apikey: Option<String>,

    /// Enrichment worker pool size
    #[structopt(skip)]
    pub geo_concurrency: Option<usize>,

    /// Transport failures after which enrichment is abandoned for the run
    #[structopt(skip)]
    pub geo_giveup_limit: Option<usize>,

    /// Failed liveness checks before a record is evicted
    #[structopt(long)]
    pub eviction_threshold: Option<u64>,

    /// Interval between scheduled pipeline runs in seconds
    #[structopt(long)]
    pub run_interval: Option<u64>,

    /// Per-stage timeout in seconds, 0 disables
    #[structopt(skip)]
    pub stage_timeout: Option<u64>,

    /// Remove records that were re-observed but never enriched
    #[serde(default)]
    #[structopt(long)]
    pub purge_unenriched: bool,
}

impl From<SettingsOpt> for Settings {
    fn from(opt: SettingsOpt) -> Self {
        let def = Settings::default();

        Self {
            discovery_endpoint: opt.discovery_endpoint.unwrap_or(def.discovery_endpoint),
            discovery_pages: opt.discovery_pages.unwrap_or(def.discovery_pages),
            discovery_retry_limit: opt.discovery_retry_limit.unwrap_or(def.discovery_retry_limit),
            discovery_retry_pause: opt.discovery_retry_pause.unwrap_or(def.discovery_retry_pause),
            probe_timeout: opt.probe_timeout.unwrap_or(def.probe_timeout),
            probe_concurrency: opt.probe_concurrency.unwrap_or(def.probe_concurrency),
            geo_endpoint: opt.geo_endpoint.unwrap_or(def.geo_endpoint),
            geo_apikey: opt.geo_apikey.unwrap_or(def.geo_apikey),
            geo_concurrency: opt.geo_concurrency.unwrap_or(def.geo_concurrency),
            geo_giveup_limit: opt.geo_giveup_limit.unwrap_or(def.geo_giveup_limit),
            eviction_threshold: opt.eviction_threshold.unwrap_or(def.eviction_threshold),
            run_interval: opt.run_interval.unwrap_or(def.run_interval),
            stage_timeout: opt.stage_timeout.unwrap_or(def.stage_timeout),
            purge_unenriched: opt.purge_unenriched,
        }
    }
}
