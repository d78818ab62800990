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

use super::Taxonomy;

/// Case-insensitive substring predicate over a raw free-text field.
enum Predicate {
    /// Matches when any listed token is present
    Any(&'static [&'static str]),
    /// Matches when every listed token is present
    All(&'static [&'static str]),
}

impl Predicate {
    fn matches(&self, folded: &str) -> bool {
        match self {
            Self::Any(tokens) => tokens.iter().any(|t| folded.contains(t)),
            Self::All(tokens) => tokens.iter().all(|t| folded.contains(t)),
        }
    }
}

/// First-match-wins rule. Ordering within a taxonomy's rule list is part
/// of the contract: conjunction rules like Huawei/Dell must run before
/// bare vendor-token rules that would also match their cloud offerings.
struct Rule {
    label: &'static str,
    predicate: Predicate,
}

const CLIENT_RULES: &[Rule] = &[
    Rule { label: "Geth", predicate: Predicate::Any(&["geth", "go-ethereum"]) },
    Rule { label: "Nethermind", predicate: Predicate::Any(&["nethermind"]) },
    Rule { label: "Besu", predicate: Predicate::Any(&["besu"]) },
    Rule { label: "Erigon", predicate: Predicate::Any(&["erigon"]) },
    Rule { label: "Reth", predicate: Predicate::Any(&["reth"]) },
    Rule { label: "EthereumJS", predicate: Predicate::Any(&["ethereumjs"]) },
];

const OS_RULES: &[Rule] = &[
    Rule { label: "Linux", predicate: Predicate::Any(&["linux"]) },
    Rule { label: "Windows", predicate: Predicate::Any(&["windows"]) },
    Rule { label: "MacOS", predicate: Predicate::Any(&["macos", "darwin"]) },
];

const ISP_RULES: &[Rule] = &[
    Rule { label: "Contabo", predicate: Predicate::Any(&["contabo"]) },
    Rule { label: "AWS", predicate: Predicate::Any(&["aws", "amazon"]) },
    Rule { label: "Azure", predicate: Predicate::Any(&["azure", "microsoft"]) },
    Rule { label: "Google", predicate: Predicate::Any(&["google"]) },
    Rule { label: "Alibaba", predicate: Predicate::Any(&["alibaba"]) },
    Rule { label: "Oracle", predicate: Predicate::Any(&["oracle"]) },
    Rule { label: "IBM", predicate: Predicate::Any(&["ibm"]) },
    Rule { label: "Tencent", predicate: Predicate::Any(&["tencent"]) },
    Rule { label: "OVHCloud", predicate: Predicate::Any(&["ovh"]) },
    Rule { label: "DigitalOcean", predicate: Predicate::Any(&["digitalocean"]) },
    Rule { label: "Linode", predicate: Predicate::Any(&["linode", "akamai"]) },
    Rule { label: "Salesforce", predicate: Predicate::Any(&["salesforce"]) },
    Rule { label: "Huawei", predicate: Predicate::All(&["huawei", "cloud"]) },
    Rule { label: "Dell", predicate: Predicate::All(&["dell", "cloud"]) },
    Rule { label: "Vultr", predicate: Predicate::Any(&["vultr"]) },
    Rule { label: "Heroku", predicate: Predicate::Any(&["heroku"]) },
    Rule { label: "Hetzner", predicate: Predicate::Any(&["hetzner"]) },
    Rule { label: "Scaleway", predicate: Predicate::Any(&["scaleway"]) },
    Rule { label: "Upcloud", predicate: Predicate::Any(&["upcloud"]) },
    Rule { label: "Kamatera", predicate: Predicate::Any(&["kamatera"]) },
];

fn rules_for(taxonomy: Taxonomy) -> &'static [Rule] {
    match taxonomy {
        Taxonomy::Client => CLIENT_RULES,
        Taxonomy::Os => OS_RULES,
        Taxonomy::Isp => ISP_RULES,
        Taxonomy::Country => &[],
    }
}

/// Canonical category labels of a taxonomy, excluding the overflow label.
/// Country has no fixed set (countries are already canonical).
pub fn categories(taxonomy: Taxonomy) -> Vec<&'static str> {
    rules_for(taxonomy).iter().map(|r| r.label).collect()
}

/// Map a raw free-text field to its canonical taxonomy label.
///
/// Total function: always returns a label from the taxonomy's fixed set,
/// falling back to the overflow label for unmatched or absent input. For
/// `Country` the input is already canonical and passes through unchanged.
pub fn classify(taxonomy: Taxonomy, raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return taxonomy.other_label().to_string()
    };

    if taxonomy == Taxonomy::Country {
        return raw.to_string()
    }

    let folded = raw.to_lowercase();
    for rule in rules_for(taxonomy) {
        if rule.predicate.matches(&folded) {
            return rule.label.to_string()
        }
    }

    taxonomy.other_label().to_string()
}
