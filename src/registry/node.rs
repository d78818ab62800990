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

use tinyjson::JsonValue;

use crate::{util::time::Timestamp, Error, Result};

/// Geographic and provider metadata produced by a successful enrichment
/// lookup. Applied to a record as a unit, never field-by-field.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub isp: String,
    pub country: String,
}

/// A single registered network node.
#[derive(Clone, Debug)]
pub struct NodeRecord {
    /// Unique hex-string node identifier
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Raw client software tag as reported by the discovery source
    pub client_raw: Option<String>,
    /// Raw operating system tag as reported by the discovery source
    pub os_raw: Option<String>,
    /// Raw provider name from the last successful enrichment lookup
    pub isp_raw: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Consecutive failed liveness checks since the last success
    pub failure_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

impl NodeRecord {
    /// Create a fresh record for a reachable candidate seen for the first time.
    pub fn new(
        id: String,
        host: String,
        port: u16,
        client_raw: Option<String>,
        os_raw: Option<String>,
        geo: Option<&GeoInfo>,
    ) -> Self {
        let mut record = Self {
            id,
            host,
            port,
            client_raw,
            os_raw,
            isp_raw: None,
            country: None,
            latitude: None,
            longitude: None,
            failure_count: 0,
            created_at: Timestamp::current_time(),
            updated_at: None,
        };

        if let Some(geo) = geo {
            record.apply_geo(geo);
        }

        record
    }

    /// Overwrite all geo fields from a successful enrichment result.
    pub fn apply_geo(&mut self, geo: &GeoInfo) {
        self.latitude = Some(geo.latitude);
        self.longitude = Some(geo.longitude);
        self.isp_raw = Some(geo.isp.clone());
        self.country = Some(geo.country.clone());
    }

    /// True if the record has never been successfully enriched.
    pub fn is_unenriched(&self) -> bool {
        self.latitude.is_none()
    }

    pub fn to_json(&self) -> JsonValue {
        let opt_str = |v: &Option<String>| match v {
            Some(s) => JsonValue::String(s.clone()),
            None => JsonValue::Null,
        };
        let opt_num = |v: Option<f64>| match v {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::Null,
        };

        JsonValue::Object(HashMap::from([
            ("id".to_string(), JsonValue::String(self.id.clone())),
            ("host".to_string(), JsonValue::String(self.host.clone())),
            ("port".to_string(), JsonValue::Number(self.port.into())),
            ("client_raw".to_string(), opt_str(&self.client_raw)),
            ("os_raw".to_string(), opt_str(&self.os_raw)),
            ("isp_raw".to_string(), opt_str(&self.isp_raw)),
            ("country".to_string(), opt_str(&self.country)),
            ("latitude".to_string(), opt_num(self.latitude)),
            ("longitude".to_string(), opt_num(self.longitude)),
            ("failure_count".to_string(), JsonValue::Number(self.failure_count as f64)),
            ("created_at".to_string(), JsonValue::Number(self.created_at.0 as f64)),
            (
                "updated_at".to_string(),
                match self.updated_at {
                    Some(ts) => JsonValue::Number(ts.0 as f64),
                    None => JsonValue::Null,
                },
            ),
        ]))
    }

    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(Error::ParseFailed("Node record is not an object"))
        };

        let get_str = |key: &str| -> Result<String> {
            match map.get(key) {
                Some(JsonValue::String(s)) => Ok(s.clone()),
                _ => Err(Error::ParseFailed("Missing string field in node record")),
            }
        };
        let get_num = |key: &str| -> Result<f64> {
            match map.get(key) {
                Some(JsonValue::Number(n)) => Ok(*n),
                _ => Err(Error::ParseFailed("Missing numeric field in node record")),
            }
        };
        let opt_str = |key: &str| -> Option<String> {
            match map.get(key) {
                Some(JsonValue::String(s)) => Some(s.clone()),
                _ => None,
            }
        };
        let opt_num = |key: &str| -> Option<f64> {
            match map.get(key) {
                Some(JsonValue::Number(n)) => Some(*n),
                _ => None,
            }
        };

        Ok(Self {
            id: get_str("id")?,
            host: get_str("host")?,
            port: get_num("port")? as u16,
            client_raw: opt_str("client_raw"),
            os_raw: opt_str("os_raw"),
            isp_raw: opt_str("isp_raw"),
            country: opt_str("country"),
            latitude: opt_num("latitude"),
            longitude: opt_num("longitude"),
            failure_count: get_num("failure_count")? as u64,
            created_at: Timestamp(get_num("created_at")? as i64),
            updated_at: opt_num("updated_at").map(|n| Timestamp(n as i64)),
        })
    }
}
