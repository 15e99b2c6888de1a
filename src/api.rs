//! 管理接口模块
//! 状态页、状态JSON与测站配置CRUD，单凭据Basic认证

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::info;

use crate::common::error::{RelayError, Result};
use crate::config::{self, StationConfig};
use crate::relay::manager::StationManager;

/// 管理界面凭据 (简单门禁，不是安全子系统)
const WEB_USER: &str = "admin";
const WEB_PASS: &str = "admin";

/// API共享状态
#[derive(Clone)]
struct ApiState {
    manager: Arc<StationManager>,
}

/// 管理HTTP服务
pub struct AdminServer {
    manager: Arc<StationManager>,
    addr: SocketAddr,
}

impl AdminServer {
    pub fn new(manager: Arc<StationManager>, addr: SocketAddr) -> Self {
        Self { manager, addr }
    }

    /// 阻塞运行HTTP服务
    pub async fn serve(self) -> Result<()> {
        let state = ApiState {
            manager: self.manager,
        };

        let router = Router::new()
            .route("/", get(get_dashboard))
            .route("/status", get(get_status))
            .route("/api/configs", get(get_configs).post(post_config))
            .route(
                "/api/configs/:id",
                get(get_config_item)
                    .put(put_config_item)
                    .delete(delete_config_item),
            )
            .layer(middleware::from_fn(basic_auth_guard))
            .with_state(state);

        info!("admin interface: http://{}", self.addr);
        axum::Server::bind(&self.addr)
            .serve(router.into_make_service())
            .await
            .map_err(|e| RelayError::ConfigIo(format!("admin server: {}", e)))
    }
}

/// Basic认证中间件
async fn basic_auth_guard<B>(req: Request<B>, next: Next<B>) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| BASE64.decode(v).ok())
        .and_then(|v| String::from_utf8(v).ok())
        .map(|v| v == format!("{}:{}", WEB_USER, WEB_PASS))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(
                header::WWW_AUTHENTICATE,
                "Basic realm=\"NTRIP Relay Monitor\"",
            )],
            "Unauthorized",
        )
            .into_response()
    }
}

/// 状态页
async fn get_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// 状态JSON：按配置顺序合并在线与占位记录
async fn get_status(State(state): State<ApiState>) -> Response {
    match state.manager.snapshot().await {
        Ok(views) => Json(views).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 读取完整配置
async fn get_configs(State(state): State<ApiState>) -> Response {
    match config::load(state.manager.config_path()) {
        Ok(configs) => Json(configs).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 新增测站，ID重复返回409
async fn post_config(
    State(state): State<ApiState>,
    Json(station): Json<StationConfig>,
) -> Response {
    let path = state.manager.config_path();
    let mut configs = match config::load(path) {
        Ok(c) => c,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    if configs.iter().any(|c| c.id == station.id) {
        return (StatusCode::CONFLICT, "ID already exists").into_response();
    }

    configs.push(station.clone());
    if let Err(e) = config::save(path, &configs) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (StatusCode::CREATED, Json(station)).into_response()
}

/// 读取单个测站
async fn get_config_item(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match config::load(state.manager.config_path()) {
        Ok(configs) => match configs.into_iter().find(|c| c.id == id) {
            Some(cfg) => Json(cfg).into_response(),
            None => (StatusCode::NOT_FOUND, "Not found").into_response(),
        },
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 更新测站，路径里的ID为准
async fn put_config_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(mut updated): Json<StationConfig>,
) -> Response {
    let path = state.manager.config_path();
    let mut configs = match config::load(path) {
        Ok(c) => c,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    updated.id = id.clone();
    let Some(slot) = configs.iter_mut().find(|c| c.id == id) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    *slot = updated.clone();

    if let Err(e) = config::save(path, &configs) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    Json(updated).into_response()
}

/// 删除测站
async fn delete_config_item(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let path = state.manager.config_path();
    let mut configs = match config::load(path) {
        Ok(c) => c,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let before = configs.len();
    configs.retain(|c| c.id != id);
    if configs.len() == before {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    if let Err(e) = config::save(path, &configs) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// 轻量状态页：每2秒拉取/status刷新表格
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>NTRIP Relay Monitor</title>
<meta charset="utf-8">
<style>
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; background: #f5f7fa; color: #333; margin: 20px; }
h1 { color: #1e40af; font-size: 24px; }
table { border-collapse: collapse; width: 100%; background: white; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
th, td { padding: 8px 12px; border-bottom: 1px solid #e5e7eb; text-align: left; font-size: 14px; }
th { background: #3b82f6; color: white; }
td.num { font-family: monospace; }
.Running { color: #10b981; font-weight: 600; }
.Error { color: #ef4444; font-weight: 600; }
.Stopped, .Disabled { color: #6b7280; }
</style>
</head>
<body>
<h1>NTRIP Relay Monitor</h1>
<table>
<thead><tr><th>ID</th><th>Status</th><th>Forwarded</th><th>Uptime</th><th>Last Message</th></tr></thead>
<tbody id="rows"></tbody>
</table>
<script>
function fmtBytes(n) {
  if (!n) return '0 B';
  const k = 1024, u = ['B','KB','MB','GB','TB'];
  const i = Math.floor(Math.log(n) / Math.log(k));
  return (n / Math.pow(k, i)).toFixed(1) + ' ' + u[i];
}
async function refresh() {
  const res = await fetch('/status');
  if (!res.ok) return;
  const stats = await res.json();
  document.getElementById('rows').innerHTML = stats.map(s =>
    `<tr><td>${s.id}</td><td class="${s.status.split(' ')[0]}">${s.status}</td>` +
    `<td class="num">${fmtBytes(s.bytes_forwarded)}</td><td>${s.uptime}</td><td>${s.last_message}</td></tr>`
  ).join('');
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;
