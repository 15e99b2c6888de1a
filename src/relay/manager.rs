//! 测站管理器
//! 轮询配置文件，对注册表做精确的增删重启，保全未受影响的测站

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::status::StationStatusView;
use super::supervisor::StationSupervisor;
use super::CONFIG_POLL_INTERVAL;
use crate::common::error::{RelayError, Result};
use crate::config::{self, StationConfig};

/// 测站管理器：注册表的唯一属主
pub struct StationManager {
    config_path: PathBuf,
    /// id → 监督器
    registry: RwLock<HashMap<String, StationSupervisor>>,
    /// 配置文件最近一次观测到的修改时间
    last_modified: Mutex<Option<SystemTime>>,
}

impl StationManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            registry: RwLock::new(HashMap::new()),
            last_modified: Mutex::new(None),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 主循环：每5秒对账一次，永不返回
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(CONFIG_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            self.reload().await;
        }
    }

    /// 单次对账：文件未动则直接返回，解析失败保留现有测站
    pub async fn reload(&self) {
        // 1. 先看修改时间，省掉无谓的读盘和解析
        let meta = match tokio::fs::metadata(&self.config_path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("cannot stat config file: {}", e);
                return;
            }
        };
        let modified = meta.modified().ok();
        {
            let mut last = self.last_modified.lock().await;
            if let (Some(prev), Some(cur)) = (*last, modified) {
                if cur <= prev {
                    return;
                }
            }
            *last = modified;
        }

        // 2. 读取并解析
        let data = match tokio::fs::read(&self.config_path).await {
            Ok(d) => d,
            Err(e) => {
                warn!("read config failed: {}", e);
                return;
            }
        };
        let configs = match config::parse(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("config parse failed, keeping previous set: {}", e);
                return;
            }
        };

        info!("configuration changed, applying");
        self.reconcile(configs).await;
    }

    /// 对账注册表：增删重启恰好受影响的监督器
    ///
    /// 全程持有注册表写锁，槽位要等监督器完全退出才释放。
    async fn reconcile(&self, configs: Vec<StationConfig>) {
        let mut registry = self.registry.write().await;
        let mut active_ids: HashSet<String> = HashSet::with_capacity(configs.len());

        for (order, cfg) in configs.iter().enumerate() {
            active_ids.insert(cfg.id.clone());
            let fingerprint = cfg.fingerprint();

            // 指纹变化或被禁用 → 停掉旧监督器
            let needs_stop = match registry.get(&cfg.id) {
                Some(sup) => {
                    sup.shared.status.set_order(order);
                    sup.shared.fingerprint != fingerprint || !cfg.enable
                }
                None => false,
            };
            if needs_stop {
                info!("[{}] config changed, restarting worker", cfg.id);
                if let Some(old) = registry.remove(&cfg.id) {
                    old.shutdown().await;
                }
            }

            if !registry.contains_key(&cfg.id) && cfg.enable {
                let sup = StationSupervisor::spawn(cfg.clone(), order);
                registry.insert(cfg.id.clone(), sup);
            }
        }

        // 配置里消失的测站
        let gone: Vec<String> = registry
            .keys()
            .filter(|id| !active_ids.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            info!("[{}] removed from config, stopping", id);
            if let Some(old) = registry.remove(&id) {
                old.shutdown().await;
            }
        }
    }

    /// 状态快照：按配置顺序合并在线监督器与占位记录
    pub async fn snapshot(&self) -> Result<Vec<StationStatusView>> {
        let data = tokio::fs::read(&self.config_path)
            .await
            .map_err(|e| RelayError::ConfigIo(e.to_string()))?;
        let configs = config::parse(&data)?;

        let registry = self.registry.read().await;
        let now = Utc::now();
        Ok(configs
            .iter()
            .enumerate()
            .map(|(order, cfg)| match registry.get(&cfg.id) {
                Some(sup) => sup.shared.status.snapshot(now, order),
                None => StationStatusView::not_started(&cfg.id, cfg.enable, order),
            })
            .collect())
    }

    /// 当前在线的监督器数量
    pub async fn live_count(&self) -> usize {
        self.registry.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
