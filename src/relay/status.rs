//! 测站状态模块
//! 对外可读的测站运行指标：字节计数用原子量，文案字段短锁保护

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// 可变状态字段，整体换入换出避免读到半更新的记录
#[derive(Debug, Clone)]
struct StatusInner {
    status: String,
    last_message: String,
    order: usize,
    start_time: DateTime<Utc>,
}

/// 单测站的可观测状态
///
/// `bytes_forwarded`在监督器整个生命周期内单调不减，
/// 会话重启不清零。
#[derive(Debug)]
pub struct StationStatus {
    id: String,
    bytes_forwarded: AtomicU64,
    inner: RwLock<StatusInner>,
}

impl StationStatus {
    pub fn new(id: String, order: usize) -> Self {
        Self {
            id,
            bytes_forwarded: AtomicU64::new(0),
            inner: RwLock::new(StatusInner {
                status: "Starting".to_string(),
                last_message: String::new(),
                order,
                start_time: Utc::now(),
            }),
        }
    }

    /// 记录监督器启动时刻
    pub fn mark_started(&self) {
        self.inner.write().start_time = Utc::now();
    }

    pub fn set_status(&self, status: &str) {
        self.inner.write().status = status.to_string();
    }

    pub fn set_message(&self, message: String) {
        self.inner.write().last_message = message;
    }

    pub fn set_order(&self, order: usize) {
        self.inner.write().order = order;
    }

    /// 累加转发字节数
    pub fn add_bytes(&self, n: u64) {
        self.bytes_forwarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded.load(Ordering::Relaxed)
    }

    /// 生成当前时刻的快照
    pub fn snapshot(&self, now: DateTime<Utc>, order: usize) -> StationStatusView {
        let inner = self.inner.read();
        let uptime_secs = (now - inner.start_time).num_seconds().max(0);
        StationStatusView {
            id: self.id.clone(),
            status: inner.status.clone(),
            bytes_forwarded: self.bytes_forwarded(),
            uptime: format_uptime(uptime_secs),
            last_message: inner.last_message.clone(),
            order,
        }
    }
}

/// 状态快照，供管理接口序列化输出
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StationStatusView {
    pub id: String,
    pub status: String,
    pub bytes_forwarded: u64,
    pub uptime: String,
    pub last_message: String,
    #[serde(skip)]
    pub order: usize,
}

impl StationStatusView {
    /// 配置中存在但未运行的测站占位记录
    pub fn not_started(id: &str, enabled: bool, order: usize) -> Self {
        let (status, message) = if enabled {
            ("Not Started", "Waiting to start")
        } else {
            ("Disabled", "Station is disabled in config")
        };
        Self {
            id: id.to_string(),
            status: status.to_string(),
            bytes_forwarded: 0,
            uptime: "0s".to_string(),
            last_message: message.to_string(),
            order,
        }
    }
}

/// 秒数转紧凑时长串：0s / 45s / 1m30s / 2h3m4s
fn format_uptime(total_secs: i64) -> String {
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    if hours > 0 {
        format!("{}h{}m{}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m{}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
