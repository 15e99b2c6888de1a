//! NTRIP 中继核心库
//! 多测站RTCM数据转发服务：源Caster拉流 + 目标Caster推流 + NMEA心跳伪装

use std::sync::Arc;

// 配置模块
pub mod config;

// 公共组件
pub mod common {
    pub mod device;
    pub mod error;
    pub mod nmea;
}

// 连接层
pub mod connection;

// 中继核心
pub mod relay;

// 管理接口
pub mod api;

pub use common::error::{RelayError, Result};
pub use relay::manager::StationManager;

/// 初始化日志
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// 启动中继服务：管理接口 + 测站管理器主循环
pub async fn run(config_path: &str, admin_addr: &str) -> Result<()> {
    let manager = Arc::new(StationManager::new(config_path));

    // 管理接口在后台运行，失败不影响转发
    let addr = admin_addr
        .parse()
        .map_err(|e| RelayError::ConfigParse(format!("invalid admin addr: {}", e)))?;
    let admin = api::AdminServer::new(manager.clone(), addr);
    tokio::spawn(async move {
        if let Err(e) = admin.serve().await {
            tracing::error!("admin server exited: {}", e);
        }
    });

    // 主循环：每5秒对账一次配置
    manager.run().await
}
