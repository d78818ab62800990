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

//! JSON-RPC server-side implementation.
use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use log::{debug, error, info};
use smol::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    lock::MutexGuard,
    net::{SocketAddr, TcpListener, TcpStream},
};
use tinyjson::JsonValue;
use url::Url;

use super::jsonrpc::{ErrorCode, JsonError, JsonRequest, JsonResponse, JsonResult};
use crate::{
    system::{ExecutorPtr, StoppableTask, StoppableTaskPtr},
    Error, Result,
};

/// Asynchronous trait implementing a handler for incoming JSON-RPC requests.
///
/// Implementors match on the request method and branch out to functions
/// handling the respective methods. The trait additionally tracks the
/// connection tasks spawned by [`listen_and_serve`] so a daemon can stop
/// all active connections on shutdown.
#[async_trait]
pub trait RequestHandler: Sync + Send {
    async fn handle_request(&self, req: JsonRequest) -> JsonResult;

    // RPCAPI:
    // Replies to a ping method.
    // --> {"jsonrpc": "2.0", "method": "ping", "params": [], "id": 42}
    // <-- {"jsonrpc": "2.0", "result": "pong", "id": 42}
    async fn pong(&self, id: u16, _params: JsonValue) -> JsonResult {
        JsonResponse::new(JsonValue::String("pong".to_string()), id).into()
    }

    async fn connections_mut(&self) -> MutexGuard<'_, HashSet<StoppableTaskPtr>>;

    async fn stop_connections(&self) {
        info!(target: "rpc::server", "[RPC] Server stopped, closing connections");
        for task in self.connections_mut().await.iter() {
            task.stop().await;
        }
    }

    async fn mark_connection(&self, task: StoppableTaskPtr) {
        self.connections_mut().await.insert(task);
    }

    async fn unmark_connection(&self, task: StoppableTaskPtr) {
        self.connections_mut().await.remove(&task);
    }
}

/// Reads a newline-terminated JSON-RPC message from the given reader.
async fn read_from_stream(reader: &mut BufReader<TcpStream>, buf: &mut String) -> Result<usize> {
    let n = reader.read_line(buf).await?;
    if n == 0 {
        return Err(
            crate::error::RpcError::ConnectionClosed("EOF while reading".to_string()).into()
        )
    }

    Ok(n)
}

/// Writes a JSON-RPC reply to the given stream, terminated with a newline.
async fn write_to_stream(stream: &mut TcpStream, reply: &JsonResult) -> Result<()> {
    let reply = match reply {
        JsonResult::Response(v) => v.stringify()?,
        JsonResult::Error(v) => v.stringify()?,
        JsonResult::Notification(v) => v.stringify()?,
        JsonResult::Request(v) => v.stringify()?,
    };

    stream.write_all(reply.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    Ok(())
}

/// Internal function that runs inside a loop for accepting incoming
/// JSON-RPC requests and passing them to the [`RequestHandler`].
async fn accept(
    stream: TcpStream,
    peer_addr: SocketAddr,
    rh: Arc<impl RequestHandler + 'static>,
) -> Result<()> {
    let mut writer = stream.clone();
    let mut reader = BufReader::new(stream);

    loop {
        let mut buf = String::new();
        read_from_stream(&mut reader, &mut buf).await?;

        let line = buf.trim();
        if line.is_empty() {
            continue
        }

        debug!(target: "rpc::server", "{} --> {}", peer_addr, line);

        let reply: JsonResult = match line.parse::<JsonValue>() {
            Ok(val) => match JsonRequest::try_from(&val) {
                Ok(req) => rh.handle_request(req).await,
                Err(e) => JsonError::new(ErrorCode::InvalidRequest, Some(e.to_string()), 0).into(),
            },
            Err(e) => JsonError::new(ErrorCode::ParseError, Some(e.to_string()), 0).into(),
        };

        if let JsonResult::Response(ref v) = reply {
            debug!(target: "rpc::server", "{} <-- {}", peer_addr, v.stringify()?);
        }

        write_to_stream(&mut writer, &reply).await?;
    }
}

/// Wrapper function around [`accept()`] to take the incoming connection and
/// pass it forward.
async fn run_accept_loop(
    listener: TcpListener,
    rh: Arc<impl RequestHandler + 'static>,
    ex: ExecutorPtr,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        info!(target: "rpc::server", "[RPC] Server accepted conn from {}", peer_addr);

        let rh_ = rh.clone();
        let task = StoppableTask::new();
        let task_ = task.clone();
        task.clone().start(
            accept(stream, peer_addr, rh.clone()),
            move |result| async move {
                match result {
                    Ok(()) | Err(Error::DetachedTaskStopped) => {
                        debug!(target: "rpc::server", "Closed conn from {}", peer_addr)
                    }
                    Err(e) => {
                        debug!(target: "rpc::server", "Closed conn from {}: {}", peer_addr, e)
                    }
                }

                rh_.unmark_connection(task_.clone()).await;
            },
            Error::DetachedTaskStopped,
            ex.clone(),
        );

        rh.mark_connection(task.clone()).await;
    }
}

/// Start a JSON-RPC server bound to the given listen URL and use the given
/// [`RequestHandler`] to handle incoming requests.
pub async fn listen_and_serve(
    listen_url: Url,
    rh: Arc<impl RequestHandler + 'static>,
    ex: ExecutorPtr,
) -> Result<()> {
    if listen_url.scheme() != "tcp" {
        return Err(Error::UnsupportedTransport(listen_url.scheme().to_string()))
    }

    let (Some(host), Some(port)) = (listen_url.host_str(), listen_url.port()) else {
        return Err(Error::BindFailed(listen_url.as_str().into()))
    };

    debug!(target: "rpc::server", "Trying to bind listener on {}", listen_url);

    let listener = match TcpListener::bind((host, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(target: "rpc::server", "[RPC] Bind to {} failed: {}", listen_url, e);
            return Err(Error::BindFailed(listen_url.as_str().into()))
        }
    };

    info!(target: "rpc::server", "[RPC] Server listening on {}", listen_url);
    run_accept_loop(listener, rh, ex).await
}

#[cfg(test)]
mod tests {
    use smol::lock::Mutex;

    use super::*;
    use crate::rpc::{
        jsonrpc::JsonResponse,
        util::{json_str, JsonValue},
    };

    struct EchoRpc {
        connections: Mutex<HashSet<StoppableTaskPtr>>,
    }

    #[async_trait]
    impl RequestHandler for EchoRpc {
        async fn handle_request(&self, req: JsonRequest) -> JsonResult {
            match req.method.as_str() {
                "echo" => JsonResponse::new(req.params, req.id).into(),
                _ => JsonError::new(ErrorCode::MethodNotFound, None, req.id).into(),
            }
        }

        async fn connections_mut(&self) -> MutexGuard<'_, HashSet<StoppableTaskPtr>> {
            self.connections.lock().await
        }
    }

    #[test]
    fn serve_and_echo() {
        let ex = Arc::new(smol::Executor::new());
        smol::block_on(ex.clone().run(async {
            // Bind on an ephemeral port first so we know where to connect
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();

            let rh = Arc::new(EchoRpc { connections: Mutex::new(HashSet::new()) });
            let rh_ = rh.clone();
            let ex_ = ex.clone();
            ex.spawn(async move { run_accept_loop(listener, rh_, ex_).await }).detach();

            let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let mut writer = stream.clone();
            let mut reader = BufReader::new(stream);

            let req = JsonRequest::new("echo", JsonValue::Array(vec![json_str("hi")]));
            writer.write_all(req.stringify().unwrap().as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let rep: JsonValue = line.trim().parse().unwrap();
            let rep = JsonResponse::try_from(&rep).unwrap();
            assert_eq!(rep.id, req.id);

            let params: &Vec<JsonValue> = rep.result.get().unwrap();
            let echoed: &String = params[0].get().unwrap();
            assert_eq!(echoed, "hi");

            // Unknown methods get a JSON-RPC error back
            let req = JsonRequest::new("nope", JsonValue::Array(vec![]));
            writer.write_all(req.stringify().unwrap().as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let rep: JsonValue = line.trim().parse().unwrap();
            let rep = crate::rpc::jsonrpc::JsonError::try_from(&rep).unwrap();
            assert_eq!(rep.error.code, ErrorCode::MethodNotFound.code());
        }));
    }
}
