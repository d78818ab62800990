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

//! JSON-RPC 2.0 object definitions
use std::collections::HashMap;

use rand::{rngs::OsRng, Rng};
use tinyjson::JsonValue;

use crate::{error::RpcError, Result};

/// JSON-RPC error codes.
/// The error codes `[-32768, -32000]` are reserved for predefined errors.
#[derive(Copy, Clone, Debug)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist / is not available.
    MethodNotFound,
    /// Invalid method parameter(s).
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Reserved for implementation-defined server-errors.
    ServerError(i32),
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match *self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError(c) => c,
        }
    }

    pub fn message(&self) -> String {
        match *self {
            Self::ParseError => "parse error".to_string(),
            Self::InvalidRequest => "invalid request".to_string(),
            Self::MethodNotFound => "method not found".to_string(),
            Self::InvalidParams => "invalid params".to_string(),
            Self::InternalError => "internal error".to_string(),
            Self::ServerError(_) => "server error".to_string(),
        }
    }
}

/// Wrapping enum around the available JSON-RPC object types
#[derive(Clone, Debug)]
pub enum JsonResult {
    Response(JsonResponse),
    Error(JsonError),
    Notification(JsonNotification),
    Request(JsonRequest),
}

impl From<JsonResponse> for JsonResult {
    fn from(resp: JsonResponse) -> Self {
        Self::Response(resp)
    }
}

impl From<JsonError> for JsonResult {
    fn from(err: JsonError) -> Self {
        Self::Error(err)
    }
}

impl From<JsonNotification> for JsonResult {
    fn from(notif: JsonNotification) -> Self {
        Self::Notification(notif)
    }
}

/// Validates the shared envelope fields of a JSON-RPC object and
/// returns the underlying map.
fn validate_envelope(value: &JsonValue) -> std::result::Result<&HashMap<String, JsonValue>, RpcError> {
    let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
        return Err(RpcError::InvalidJson("JSON is not an Object".to_string()))
    };

    match map.get("jsonrpc") {
        Some(JsonValue::String(version)) if version == "2.0" => Ok(map),
        _ => Err(RpcError::InvalidJson(
            "Object does not contain a valid \"jsonrpc\" field".to_string(),
        )),
    }
}

fn validate_id(map: &HashMap<String, JsonValue>) -> std::result::Result<u16, RpcError> {
    match map.get("id") {
        Some(JsonValue::Number(id)) => Ok(*id as u16),
        _ => Err(RpcError::InvalidJson("Object does not contain a valid \"id\" field".to_string())),
    }
}

fn validate_method(map: &HashMap<String, JsonValue>) -> std::result::Result<String, RpcError> {
    match map.get("method") {
        Some(JsonValue::String(method)) => Ok(method.clone()),
        _ => Err(RpcError::InvalidJson(
            "Object does not contain a valid \"method\" field".to_string(),
        )),
    }
}

fn validate_params(map: &HashMap<String, JsonValue>) -> std::result::Result<JsonValue, RpcError> {
    match map.get("params") {
        Some(params) if params.is_object() || params.is_array() => Ok(params.clone()),
        _ => Err(RpcError::InvalidJson(
            "Object does not contain a valid \"params\" field".to_string(),
        )),
    }
}

/// A JSON-RPC request object
#[derive(Clone, Debug)]
pub struct JsonRequest {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: u16,
    /// Request method
    pub method: String,
    /// Request parameters
    pub params: JsonValue,
}

impl JsonRequest {
    /// Create a new [`JsonRequest`] object with the given method and parameters.
    /// The request ID is chosen randomly.
    pub fn new(method: &str, params: JsonValue) -> Self {
        assert!(params.is_object() || params.is_array());
        Self { jsonrpc: "2.0", id: OsRng.gen(), method: method.to_string(), params }
    }

    /// Convert the object into a JSON string
    pub fn stringify(&self) -> Result<String> {
        let v: JsonValue = self.into();
        Ok(v.stringify()?)
    }
}

impl From<&JsonRequest> for JsonValue {
    fn from(req: &JsonRequest) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("jsonrpc".to_string(), JsonValue::String(req.jsonrpc.to_string())),
            ("id".to_string(), JsonValue::Number(req.id.into())),
            ("method".to_string(), JsonValue::String(req.method.clone())),
            ("params".to_string(), req.params.clone()),
        ]))
    }
}

impl TryFrom<&JsonValue> for JsonRequest {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> std::result::Result<Self, Self::Error> {
        let map = validate_envelope(value)?;

        Ok(Self {
            jsonrpc: "2.0",
            id: validate_id(map)?,
            method: validate_method(map)?,
            params: validate_params(map)?,
        })
    }
}

/// A JSON-RPC notification object
#[derive(Clone, Debug)]
pub struct JsonNotification {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Notification method
    pub method: String,
    /// Notification parameters
    pub params: JsonValue,
}

impl JsonNotification {
    /// Create a new [`JsonNotification`] object with the given method and parameters.
    pub fn new(method: &str, params: JsonValue) -> Self {
        assert!(params.is_object() || params.is_array());
        Self { jsonrpc: "2.0", method: method.to_string(), params }
    }

    /// Convert the object into a JSON string
    pub fn stringify(&self) -> Result<String> {
        let v: JsonValue = self.into();
        Ok(v.stringify()?)
    }
}

impl From<&JsonNotification> for JsonValue {
    fn from(notif: &JsonNotification) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("jsonrpc".to_string(), JsonValue::String(notif.jsonrpc.to_string())),
            ("method".to_string(), JsonValue::String(notif.method.clone())),
            ("params".to_string(), notif.params.clone()),
        ]))
    }
}

/// A JSON-RPC response object
#[derive(Clone, Debug)]
pub struct JsonResponse {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: u16,
    /// Response result
    pub result: JsonValue,
}

impl JsonResponse {
    /// Create a new [`JsonResponse`] object with the given ID and result value.
    /// Creating a `JsonResponse` implies that the method call was successful.
    pub fn new(result: JsonValue, id: u16) -> Self {
        Self { jsonrpc: "2.0", id, result }
    }

    /// Convert the object into a JSON string
    pub fn stringify(&self) -> Result<String> {
        let v: JsonValue = self.into();
        Ok(v.stringify()?)
    }
}

impl From<&JsonResponse> for JsonValue {
    fn from(rep: &JsonResponse) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("jsonrpc".to_string(), JsonValue::String(rep.jsonrpc.to_string())),
            ("id".to_string(), JsonValue::Number(rep.id.into())),
            ("result".to_string(), rep.result.clone()),
        ]))
    }
}

impl TryFrom<&JsonValue> for JsonResponse {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> std::result::Result<Self, Self::Error> {
        let map = validate_envelope(value)?;

        let Some(result) = map.get("result") else {
            return Err(RpcError::InvalidJson(
                "Response does not contain a valid \"result\" field".to_string(),
            ))
        };

        Ok(Self { jsonrpc: "2.0", id: validate_id(map)?, result: result.clone() })
    }
}

/// A JSON-RPC error object
#[derive(Clone, Debug)]
pub struct JsonError {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: u16,
    /// JSON-RPC error (code and message)
    pub error: JsonErrorVal,
}

/// A JSON-RPC error value (code and message)
#[derive(Clone, Debug)]
pub struct JsonErrorVal {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
}

impl JsonError {
    /// Create a new [`JsonError`] object with the given error code, optional
    /// message, and a response ID.
    /// Creating a `JsonError` implies that the method call was unsuccessful.
    pub fn new(c: ErrorCode, message: Option<String>, id: u16) -> Self {
        let error = JsonErrorVal { code: c.code(), message: message.unwrap_or(c.message()) };
        Self { jsonrpc: "2.0", id, error }
    }

    /// Convert the object into a JSON string
    pub fn stringify(&self) -> Result<String> {
        let v: JsonValue = self.into();
        Ok(v.stringify()?)
    }
}

impl From<&JsonError> for JsonValue {
    fn from(err: &JsonError) -> JsonValue {
        let errmap = JsonValue::Object(HashMap::from([
            ("code".to_string(), JsonValue::Number(err.error.code.into())),
            ("message".to_string(), JsonValue::String(err.error.message.clone())),
        ]));

        JsonValue::Object(HashMap::from([
            ("jsonrpc".to_string(), JsonValue::String(err.jsonrpc.to_string())),
            ("id".to_string(), JsonValue::Number(err.id.into())),
            ("error".to_string(), errmap),
        ]))
    }
}

impl TryFrom<&JsonValue> for JsonError {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> std::result::Result<Self, Self::Error> {
        let map = validate_envelope(value)?;
        let id = validate_id(map)?;

        let Some(errval) = map.get("error") else {
            return Err(RpcError::InvalidJson(
                "Error does not contain a valid \"error\" field".to_string(),
            ))
        };

        let (Some(JsonValue::Number(code)), Some(JsonValue::String(message))) =
            (errval.get::<HashMap<String, JsonValue>>().and_then(|m| m.get("code")),
             errval.get::<HashMap<String, JsonValue>>().and_then(|m| m.get("message")))
        else {
            return Err(RpcError::InvalidJson(
                "Error does not contain valid \"error.code\"/\"error.message\" fields".to_string(),
            ))
        };

        Ok(Self {
            jsonrpc: "2.0",
            id,
            error: JsonErrorVal { code: *code as i32, message: message.clone() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let req = JsonRequest::new("ping", JsonValue::Array(vec![]));
        let value: JsonValue = (&req).into();
        let parsed = JsonRequest::try_from(&value).unwrap();
        assert_eq!(parsed.method, "ping");
        assert_eq!(parsed.id, req.id);
    }

    #[test]
    fn invalid_envelope_is_rejected() {
        let value: JsonValue = r#"{"id": 1, "method": "ping", "params": []}"#.parse().unwrap();
        assert!(JsonRequest::try_from(&value).is_err());

        let value: JsonValue =
            r#"{"jsonrpc": "2.0", "id": 1, "method": "ping", "params": "x"}"#.parse().unwrap();
        assert!(JsonRequest::try_from(&value).is_err());
    }

    #[test]
    fn error_object_shape() {
        let err = JsonError::new(ErrorCode::InvalidParams, None, 7);
        let value: JsonValue = (&err).into();
        let parsed = JsonError::try_from(&value).unwrap();
        assert_eq!(parsed.error.code, -32602);
        assert_eq!(parsed.error.message, "invalid params");
        assert_eq!(parsed.id, 7);
    }
}
