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
    hash::{Hash, Hasher},
    sync::Arc,
};

use futures::{Future, FutureExt};
use rand::{rngs::OsRng, Rng};
use smol::Executor;

pub type StoppableTaskPtr = Arc<StoppableTask>;

/// A task that can be prematurely (and cleanly) stopped at any time.
///
/// ```rust,ignore
/// let task = StoppableTask::new();
/// task.clone().start(
///     my_method(),
///     |result| self_.handle_stop(result),
///     Error::MyStopError,
///     executor,
/// );
/// ```
///
/// Then at any time we can call `task.stop()` to close the task.
pub struct StoppableTask {
    /// Random identifier, used so tasks can live in hash containers
    task_id: u32,
    stop_send: smol::channel::Sender<()>,
    stop_recv: smol::channel::Receiver<()>,
}

impl Hash for StoppableTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.task_id.hash(state);
    }
}

impl PartialEq for StoppableTask {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}

impl Eq for StoppableTask {}

impl StoppableTask {
    pub fn new() -> Arc<Self> {
        let (stop_send, stop_recv) = smol::channel::unbounded();
        Arc::new(Self { task_id: OsRng.gen(), stop_send, stop_recv })
    }

    /// Stops the task. On failure, it will log an error.
    pub async fn stop(&self) {
        // Ignore any errors from this send
        let _ = self.stop_send.send(()).await;
    }

    /// Starts the task.
    ///
    /// * `main` is a future that is run by the task
    /// * `stop_handler` is called when the task completes or is cancelled
    /// * `stop_value` is the Error code passed to `stop_handler` when
    ///   the task is cancelled
    /// * `executor` is the executor the task is spawned on
    pub fn start<'a, MainFut, StopFut, StopFn, Error>(
        self: Arc<Self>,
        main: MainFut,
        stop_handler: StopFn,
        stop_value: Error,
        executor: Arc<Executor<'a>>,
    ) where
        MainFut: Future<Output = std::result::Result<(), Error>> + Send + 'a,
        StopFut: Future<Output = ()> + Send,
        StopFn: FnOnce(std::result::Result<(), Error>) -> StopFut + Send + 'a,
        Error: std::error::Error + Send + 'a,
    {
        executor
            .spawn(async move {
                let result = futures::select! {
                    _ = self.stop_recv.recv().fuse() => Err(stop_value),
                    result = main.fuse() => result
                };

                stop_handler(result).await;
            })
            .detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn stop_cancels_main_future() {
        let ex = Arc::new(Executor::new());
        smol::block_on(ex.clone().run(async {
            let (done_send, done_recv) = smol::channel::unbounded::<bool>();

            let task = StoppableTask::new();
            task.clone().start(
                async {
                    // Would run forever unless stopped
                    smol::future::pending::<()>().await;
                    Ok(())
                },
                |res: std::result::Result<(), Error>| async move {
                    let stopped = matches!(res, Err(Error::DetachedTaskStopped));
                    done_send.send(stopped).await.unwrap();
                },
                Error::DetachedTaskStopped,
                ex.clone(),
            );

            task.stop().await;
            assert!(done_recv.recv().await.unwrap());
        }));
    }
}
