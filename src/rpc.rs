//! JSON-RPC Server 模块 - stdio 上的 monitor API
//!
//! 每行一个 JSON-RPC 2.0 请求，每行一个响应。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::error::ManagerError;
use crate::manager::MonitorManager;
use crate::monitor::Monitor;
use crate::validate::{self, CreateParams, UpdateParams, ValidationError};

/// 请求行不是合法的 JSON-RPC
pub const PARSE_ERROR: i32 = -32700;
/// 方法不存在
pub const METHOD_NOT_FOUND: i32 = -32601;
/// 参数校验失败
pub const INVALID_PARAMS: i32 = -32602;
/// 内部错误（store 失败等）
pub const INTERNAL_ERROR: i32 = -32603;
/// monitor 不存在
pub const NOT_FOUND: i32 = -32004;

/// RPC 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// RPC 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// RPC 错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(NOT_FOUND, "Monitor not found")
    }
}

impl From<ValidationError> for RpcError {
    fn from(e: ValidationError) -> Self {
        Self::new(INVALID_PARAMS, e.to_string())
    }
}

impl From<ManagerError> for RpcError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::Store(e) => {
                error!(error = %e, "Store operation failed");
                Self::new(INTERNAL_ERROR, "A database error occurred")
            }
            ManagerError::InvariantViolation(message) => {
                error!(error = %message, "Manager invariant violated");
                Self::new(INTERNAL_ERROR, "An error occurred")
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdParams {
    #[serde(default)]
    id: Option<String>,
}

/// Monitor API Server
pub struct RpcServer {
    manager: MonitorManager,
    default_timeout: u64,
}

impl RpcServer {
    pub fn new(manager: MonitorManager, default_timeout: u64) -> Self {
        Self {
            manager,
            default_timeout,
        }
    }

    pub fn manager(&self) -> &MonitorManager {
        &self.manager
    }

    /// 运行 Server (stdio 模式)，直到 stdin EOF
    pub async fn run(&self) -> Result<()> {
        info!("Heartbeat monitor RPC server started (stdio)");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// 从任意 reader / writer 读写请求
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                break; // EOF
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    warn!(error = %e, "Failed to parse request");
                    RpcResponse::failure(None, RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)))
                }
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        Ok(())
    }

    /// 处理单个请求
    pub async fn handle_request(&self, request: RpcRequest) -> RpcResponse {
        let params = request.params.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "monitor/create" => self.handle_create(params).await,
            "monitor/get" => self.handle_get(params).await,
            "monitor/update" => self.handle_update(params).await,
            "monitor/tick" => self.handle_tick(params).await,
            "monitor/delete" => self.handle_delete(params).await,
            "manager/stats" => self.handle_stats(),
            _ => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(e) => RpcResponse::failure(request.id, e),
        }
    }

    async fn handle_create(&self, params: Value) -> Result<Value, RpcError> {
        let params: CreateParams = parse_params(params)?;
        let request = validate::validate_create(&params, self.default_timeout)?;

        let monitor = self
            .manager
            .create(request.name, request.timeout, request.notification)
            .await?;
        to_value(&monitor)
    }

    async fn handle_get(&self, params: Value) -> Result<Value, RpcError> {
        let id = parse_id(params)?;
        match self.manager.get(&id).await? {
            Some(monitor) => to_value(&monitor),
            None => Err(RpcError::not_found()),
        }
    }

    async fn handle_update(&self, params: Value) -> Result<Value, RpcError> {
        let params: UpdateParams = parse_params(params)?;
        let (id, patch) = validate::validate_update(&params)?;

        match self.manager.update(&id, patch).await? {
            Some(monitor) => to_value(&monitor),
            None => Err(RpcError::not_found()),
        }
    }

    async fn handle_tick(&self, params: Value) -> Result<Value, RpcError> {
        let id = parse_id(params)?;
        match self.manager.tick(&id).await? {
            Some(monitor) => to_value(&monitor),
            None => Err(RpcError::not_found()),
        }
    }

    async fn handle_delete(&self, params: Value) -> Result<Value, RpcError> {
        let id = parse_id(params)?;
        match self.manager.delete(&id).await? {
            Some(_) => Ok(json!({"status": "done"})),
            None => Err(RpcError::not_found()),
        }
    }

    fn handle_stats(&self) -> Result<Value, RpcError> {
        serde_json::to_value(self.manager.statistics())
            .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
    }
}

fn parse_params<T>(params: Value) -> Result<T, RpcError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

fn parse_id(params: Value) -> Result<crate::monitor::MonitorId, RpcError> {
    let params: IdParams = parse_params(params)?;
    let id = params
        .id
        .ok_or_else(|| ValidationError::Required("id".to_string()))?;
    Ok(validate::validate_id(&id)?)
}

fn to_value(monitor: &Monitor) -> Result<Value, RpcError> {
    serde_json::to_value(monitor).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_error_mapping() {
        let err: RpcError = ManagerError::Store(anyhow::anyhow!("disk full")).into();
        assert_eq!(err, RpcError::new(INTERNAL_ERROR, "A database error occurred"));

        let err: RpcError = ManagerError::InvariantViolation("dup".to_string()).into();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(!err.message.contains("dup"));
    }

    #[test]
    fn test_validation_error_mapping() {
        let err: RpcError = ValidationError::InvalidTimeout.into();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.message, "`timeout` must be a positive integer");
    }

    #[test]
    fn test_parse_error_response_has_null_id() {
        let response = RpcResponse::failure(None, RpcError::new(PARSE_ERROR, "Parse error"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert!(json.as_object().unwrap().contains_key("id"));
        assert_eq!(json["error"]["code"], -32700);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(
            parse_id(Value::Null).unwrap_err().message,
            "`id` is required"
        );
        assert_eq!(
            parse_id(json!({"id": "xyz"})).unwrap_err().message,
            "`id` is invalid"
        );
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_id(json!({ "id": id })).unwrap().as_str(), id);
    }
}
