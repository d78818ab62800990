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

//! Fixed taxonomies, free-text classification, the derived taxonomy
//! graph, and aggregate statistics.
use std::str::FromStr;

use crate::{Error, Result};

/// Free-text classification rules
pub mod classify;
pub use classify::classify;

/// Hierarchical taxonomy graph
pub mod graph;
pub use graph::{GraphCounts, TaxonomyGraph};

/// Aggregate statistics over the registry
pub mod stats;
pub use stats::{aggregate, StatRow};

/// The four fixed taxonomies nodes are classified into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Taxonomy {
    Client,
    Os,
    Isp,
    Country,
}

impl Taxonomy {
    /// The taxonomy's overflow label for unmatched or absent input.
    pub fn other_label(&self) -> &'static str {
        match self {
            Self::Client => "Other Clients",
            Self::Os => "Other OSs",
            Self::Isp => "Other ISPs",
            Self::Country => "Other Countries",
        }
    }
}

impl FromStr for Taxonomy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Self::Client),
            "os" => Ok(Self::Os),
            "isp" => Ok(Self::Isp),
            "country" => Ok(Self::Country),
            _ => Err(Error::UnknownTaxonomy(s.to_string())),
        }
    }
}
