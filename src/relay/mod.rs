//! 中继核心：会话引擎、测站监督器与测站管理器

use std::time::Duration;

pub mod manager;
pub mod session;
pub mod status;
pub mod supervisor;

// 重新导出常用类型
pub use manager::StationManager;
pub use status::{StationStatus, StationStatusView};
pub use supervisor::{StationShared, StationSupervisor};

/// 普通错误基础重试间隔
pub const NORMAL_RETRY_DELAY: Duration = Duration::from_secs(5);
/// 服务器封锁类错误的等待时长
pub const BLOCK_RETRY_DELAY: Duration = Duration::from_secs(30);
/// 短会话后的等待时长 (防重试风暴)
pub const SHORT_SESSION_DELAY: Duration = Duration::from_secs(20);
/// 重试间隔上限
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);
/// 会话被视为稳定的最短运行时长
pub const MIN_STABLE_SESSION: Duration = Duration::from_secs(60);

/// 源读取超时 (滚动，每轮迭代重设)
pub const READ_TIMEOUT: Duration = Duration::from_secs(90);
/// 目标写入超时
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// NMEA心跳写入超时
pub const NMEA_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// 上游数据活跃窗口 (秒)：窗口内有数据则GGA上报RTK固定解
pub const RECENT_DATA_WINDOW: i64 = 30;

/// 配置文件轮询间隔
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);
