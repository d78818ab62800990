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

use std::{collections::HashMap, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use log::debug;
use smol::lock::{Mutex, Semaphore};

use super::{discovery::NodeCandidate, settings::Settings};
use crate::system::timeout::timeout;

/// Bounded-concurrency TCP liveness prober.
pub struct Prober {
    connect_timeout: Duration,
    concurrency: usize,
}

impl Prober {
    pub fn new(settings: &Settings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.probe_timeout),
            concurrency: settings.probe_concurrency.max(1),
        }
    }

    /// Attempt a TCP connection within the configured timeout. Any
    /// socket-level failure (refused, timeout, unreachable, resolution
    /// failure) means unreachable, never an error.
    pub async fn probe_one(&self, host: &str, port: u16) -> bool {
        let connect = smol::net::TcpStream::connect((host, port));
        matches!(timeout(self.connect_timeout, connect).await, Ok(Ok(_)))
    }

    /// Probe a batch of candidates with a bounded worker pool, writing
    /// one entry per candidate into the shared result map as each probe
    /// completes. Writing incrementally keeps partial results usable when
    /// the orchestrator abandons the stage at its timeout.
    pub async fn probe_batch(
        &self,
        candidates: &[NodeCandidate],
        results: &Mutex<HashMap<String, bool>>,
    ) {
        let semaphore = Semaphore::new(self.concurrency);

        let mut probes = FuturesUnordered::new();
        for candidate in candidates {
            probes.push(async {
                let _permit = semaphore.acquire().await;
                let reachable = self.probe_one(&candidate.host, candidate.port).await;
                debug!(
                    target: "pipeline::probe",
                    "{}:{} reachable={}", candidate.host, candidate.port, reachable
                );
                results.lock().await.insert(candidate.id.clone(), reachable);
            });
        }

        while probes.next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use smol::net::TcpListener;

    use super::*;

    fn candidate(id: &str, host: &str, port: u16) -> NodeCandidate {
        NodeCandidate {
            id: id.to_string(),
            host: host.to_string(),
            port,
            client_raw: None,
            os_raw: None,
        }
    }

    fn prober(concurrency: usize) -> Prober {
        let mut settings = Settings::default();
        settings.probe_timeout = 1;
        settings.probe_concurrency = concurrency;
        Prober::new(&settings)
    }

    #[test]
    fn probe_distinguishes_open_and_closed_ports() {
        let ex = std::sync::Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let open_port = listener.local_addr().unwrap().port();
            ex.spawn(async move {
                loop {
                    let _ = listener.accept().await;
                }
            })
            .detach();

            // Bind and immediately drop to find a port nothing listens on
            let closed_port = {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            let prober = prober(4);
            assert!(prober.probe_one("127.0.0.1", open_port).await);
            assert!(!prober.probe_one("127.0.0.1", closed_port).await);
        }));
    }

    #[test]
    fn batch_yields_one_entry_per_candidate() {
        let ex = std::sync::Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let open_port = listener.local_addr().unwrap().port();
            ex.spawn(async move {
                loop {
                    let _ = listener.accept().await;
                }
            })
            .detach();

            let closed_port = {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                l.local_addr().unwrap().port()
            };

            // 50 candidates with a pool of 10, half to the open port
            let mut candidates = vec![];
            for i in 0..50 {
                let port = if i % 2 == 0 { open_port } else { closed_port };
                candidates.push(candidate(&format!("{:02x}", i), "127.0.0.1", port));
            }

            let results = Mutex::new(HashMap::new());
            prober(10).probe_batch(&candidates, &results).await;

            let results = results.lock().await;
            assert_eq!(results.len(), 50);
            assert_eq!(results.values().filter(|r| **r).count(), 25);
            for c in &candidates {
                assert!(results.contains_key(&c.id));
            }
        }));
    }
}
