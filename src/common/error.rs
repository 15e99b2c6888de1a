//! 错误处理模块
//! 统一错误类型与重试分类

use thiserror::Error;

/// 全局错误类型
///
/// Display文本同时是状态页上的`last_message`来源，保持小写关键词
/// (timeout / rejected / eof ...) 以便外部工具按文本筛查。
#[derive(Debug, Error)]
pub enum RelayError {
    /// 配置读取错误
    #[error("read config: {0}")]
    ConfigIo(String),

    /// 配置解析错误
    #[error("parse config: {0}")]
    ConfigParse(String),

    /// 代理地址格式错误
    #[error("parse proxy: {0}")]
    ProxyParse(String),

    /// 代理拨号错误
    #[error("dial via proxy: {0}")]
    ProxyDial(String),

    /// 代理拨号超时 (上下文先于拨号结果触发)
    #[error("proxy dial timeout")]
    ProxyDialTimeout,

    /// 直连拨号错误
    #[error("dial tcp {addr}: {detail}")]
    DirectDial { addr: String, detail: String },

    /// TLS握手错误
    #[error("tls handshake: {0}")]
    TlsHandshake(String),

    /// 请求发送错误
    #[error("send request: {0}")]
    WriteRequest(String),

    /// 响应读取错误
    #[error("read response: {0}")]
    ReadResponse(String),

    /// 服务器拒绝 (携带状态行)
    #[error("rejected: {0}")]
    Rejected(String),

    /// 服务器在响应前直接断开
    #[error("server closed immediately (eof), check credentials/mountpoint")]
    ServerClosed,

    /// 源读取错误
    #[error("read source: {0}")]
    ReadSource(String),

    /// 目标写入错误
    #[error("write dest: {0}")]
    WriteDest(String),

    /// NMEA心跳写入错误
    #[error("nmea write: {0}")]
    NmeaWrite(String),

    /// 目标连接断开
    #[error("dest connection closed: {0}")]
    DestClosed(String),

    /// 取消信号 (不参与重试)
    #[error("cancelled")]
    Cancelled,
}

/// 服务器侧封锁类错误的文本特征
const PERMANENT_KEYWORDS: &[&str] = &[
    "401",
    "403",
    "404",
    "rejected",
    "unauthorized",
    "forbidden",
    "authentication failed",
    "eof",
    "forcibly closed",
];

/// 网络瞬时类错误的文本特征
const TEMPORARY_KEYWORDS: &[&str] = &[
    "timeout",
    "connection reset",
    "connection refused",
    "no route to host",
    "network is unreachable",
    "temporary failure",
    "dial tcp",
    "i/o timeout",
];

impl RelayError {
    /// 是否为服务器封锁类错误 (认证失败/被踢/提前EOF)
    ///
    /// 先按类型判定，再对包裹的底层IO错误文本做关键词兜底。
    pub fn is_permanent(&self) -> bool {
        match self {
            RelayError::Rejected(_) | RelayError::ServerClosed => true,
            RelayError::Cancelled => false,
            _ => contains_any(&self.to_string().to_lowercase(), PERMANENT_KEYWORDS),
        }
    }

    /// 是否为网络瞬时类错误 (超时/重置/不可达)
    pub fn is_temporary(&self) -> bool {
        match self {
            RelayError::ProxyDialTimeout => true,
            RelayError::Cancelled => false,
            _ => contains_any(&self.to_string().to_lowercase(), TEMPORARY_KEYWORDS),
        }
    }

    /// 是否为取消信号
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// 简化错误类型定义
pub type Result<T> = std::result::Result<T, RelayError>;
