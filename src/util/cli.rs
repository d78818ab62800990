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
    fs,
    io::Write,
    path::Path,
};

use crate::Result;

/// Map `-v` occurrence verbosity to a log level filter.
pub fn get_log_level(verbosity: u8) -> simplelog::LevelFilter {
    match verbosity {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    }
}

/// Build the logger configuration. Noisy third-party targets are
/// filtered out unless verbosity is cranked all the way up.
pub fn get_log_config(verbosity: u8) -> simplelog::Config {
    match verbosity {
        0..=2 => {
            let mut cfg = simplelog::ConfigBuilder::new();
            cfg.add_filter_ignore("async_io".to_string());
            cfg.add_filter_ignore("polling".to_string());
            cfg.add_filter_ignore("isahc".to_string());
            cfg.add_filter_ignore("surf".to_string());
            cfg.build()
        }
        _ => simplelog::Config::default(),
    }
}

/// If a config file does not exist at the given path, write the template
/// contents there and exit so the user can review it.
pub fn spawn_config(path: &Path, contents: &[u8]) -> Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(contents)?;
        println!("Config file created in {:?}. Please review it and try again.", path);
        std::process::exit(2);
    }

    Ok(())
}

/// Wraps an async fn `realmain(args, executor)` into a synchronous `main`
/// that parses CLI args merged with the TOML config, sets up logging, and
/// drives the executor on a thread-per-core pool.
///
/// The expansion also provides a `SignalHandler` the daemon uses to block
/// until a termination signal arrives.
///
/// The caller is expected to have `Args`, `CONFIG_FILE` and
/// `CONFIG_FILE_CONTENTS` in scope, and to depend on `smol`,
/// `easy-parallel`, `simplelog`, `signal-hook` and
/// `signal-hook-async-std`.
#[macro_export]
macro_rules! async_daemonize {
    ($realmain:ident) => {
        /// Auxiliary structure used to keep track of process signals
        pub struct SignalHandler {
            /// Termination signal channel receiver
            term_rx: smol::channel::Receiver<()>,
        }

        impl SignalHandler {
            pub fn new(
                ex: $crate::system::ExecutorPtr,
            ) -> $crate::Result<(Self, smol::Task<$crate::Result<()>>)> {
                let (term_tx, term_rx) = smol::channel::bounded::<()>(1);
                let signals = signal_hook_async_std::Signals::new([
                    signal_hook::consts::SIGHUP,
                    signal_hook::consts::SIGINT,
                    signal_hook::consts::SIGQUIT,
                    signal_hook::consts::SIGTERM,
                ])?;
                let signals_task = ex.spawn(handle_signals(signals, term_tx));

                Ok((Self { term_rx }, signals_task))
            }

            /// Blocks until a termination signal arrives, then cancels the
            /// signals iterator task.
            pub async fn wait_termination(
                &self,
                signals_task: smol::Task<$crate::Result<()>>,
            ) -> $crate::Result<()> {
                self.term_rx.recv().await?;
                signals_task.cancel().await;
                Ok(())
            }
        }

        async fn handle_signals(
            mut signals: signal_hook_async_std::Signals,
            term_tx: smol::channel::Sender<()>,
        ) -> $crate::Result<()> {
            use smol::stream::StreamExt;

            while let Some(signal) = signals.next().await {
                match signal {
                    signal_hook::consts::SIGHUP => {
                        log::info!(target: "signal_handler", "Caught SIGHUP (ignored)");
                    }

                    signal_hook::consts::SIGTERM |
                    signal_hook::consts::SIGINT |
                    signal_hook::consts::SIGQUIT => {
                        term_tx.send(()).await?;
                    }

                    _ => log::warn!(target: "signal_handler", "Caught unhandled signal: {}", signal),
                }
            }

            Ok(())
        }

        fn main() -> $crate::Result<()> {
            // Parse arguments twice: once to find a possible --config flag,
            // and again merged with the TOML config contents.
            let args = Args::from_args_with_toml("").unwrap();
            let cfg_path = $crate::util::path::get_config_path(args.config.clone(), CONFIG_FILE)?;
            $crate::util::cli::spawn_config(&cfg_path, CONFIG_FILE_CONTENTS.as_bytes())?;
            let args =
                Args::from_args_with_toml(&std::fs::read_to_string(&cfg_path)?).unwrap();

            let log_level = $crate::util::cli::get_log_level(args.verbose);
            let log_config = $crate::util::cli::get_log_config(args.verbose);

            match args.log {
                Some(ref log_path) => {
                    let log_path = $crate::util::path::expand_path(log_path)?;
                    let log_file = std::fs::File::create(log_path)?;
                    simplelog::CombinedLogger::init(vec![
                        simplelog::TermLogger::new(
                            log_level,
                            log_config.clone(),
                            simplelog::TerminalMode::Mixed,
                            simplelog::ColorChoice::Auto,
                        ),
                        simplelog::WriteLogger::new(log_level, log_config, log_file),
                    ])?;
                }
                None => {
                    simplelog::TermLogger::init(
                        log_level,
                        log_config,
                        simplelog::TerminalMode::Mixed,
                        simplelog::ColorChoice::Auto,
                    )?;
                }
            }

            // Thread-per-core executor pool running until realmain returns.
            let n_threads = std::thread::available_parallelism().unwrap().get();
            let ex = std::sync::Arc::new(smol::Executor::new());
            let (signal, shutdown) = smol::channel::unbounded::<()>();
            let (_, result) = easy_parallel::Parallel::new()
                .each(0..n_threads, |_| {
                    smol::future::block_on(ex.run(shutdown.recv()))
                })
                .finish(|| {
                    smol::future::block_on(async {
                        let r = $realmain(args, ex.clone()).await;
                        drop(signal);
                        r
                    })
                });

            result
        }
    };
}
