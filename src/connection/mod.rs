//! 连接层：拨号、NTRIP握手与缓冲区池

pub mod buffer;
pub mod dialer;
pub mod handshake;

// 重新导出常用类型
pub use buffer::{BufferPool, PooledBuf, BUFFER_SIZE};
pub use dialer::{dial, Conn, ProxySpec};
pub use handshake::{basic_auth, read_response, request_line, RequestKind};
