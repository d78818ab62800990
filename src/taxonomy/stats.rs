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

use super::{classify, Taxonomy};
use crate::registry::NodeRecord;

/// One aggregation row: canonical category, node count, share of the
/// registry in percent (two decimals).
#[derive(Clone, Debug, PartialEq)]
pub struct StatRow {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

fn percentage(count: usize, total: usize) -> f64 {
    (count as f64 / total as f64 * 10000.0).round() / 100.0
}

fn raw_field<'a>(taxonomy: Taxonomy, record: &'a NodeRecord) -> Option<&'a str> {
    match taxonomy {
        Taxonomy::Client => record.client_raw.as_deref(),
        Taxonomy::Os => record.os_raw.as_deref(),
        Taxonomy::Isp => record.isp_raw.as_deref(),
        Taxonomy::Country => record.country.as_deref(),
    }
}

/// Aggregate category counts and percentages over a registry snapshot.
///
/// The total is captured once from the snapshot size, so percentages are
/// comparable across rows and sum to ~100 within floating-point tolerance.
/// Country rows are ordered alphabetically; the other taxonomies are
/// ordered by descending percentage, with the overflow row included only
/// when it is non-empty. An empty snapshot yields no rows.
pub fn aggregate(taxonomy: Taxonomy, snapshot: &[NodeRecord]) -> Vec<StatRow> {
    let total = snapshot.len();
    if total == 0 {
        return vec![]
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in snapshot {
        *counts.entry(classify(taxonomy, raw_field(taxonomy, record))).or_default() += 1;
    }

    let mut rows: Vec<StatRow> = counts
        .into_iter()
        .map(|(category, count)| StatRow { category, count, percentage: percentage(count, total) })
        .collect();

    match taxonomy {
        Taxonomy::Country => rows.sort_by(|a, b| a.category.cmp(&b.category)),
        _ => rows.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category))),
    }

    rows
}
