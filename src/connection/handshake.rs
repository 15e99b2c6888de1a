//! NTRIP握手模块
//! GET/POST请求组帧与单行状态响应解析

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::timeout;

use crate::common::device::StationIdentity;
use crate::common::error::{RelayError, Result};
use crate::config::Endpoint;

/// 握手响应读取超时
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// 请求方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// 从源Caster拉流 (GET)
    SourcePull,
    /// 向目标Caster推流 (POST)
    DestinationPush,
}

/// HTTP Basic认证串
pub fn basic_auth(user: &str, pass: &str) -> String {
    BASE64.encode(format!("{}:{}", user, pass))
}

/// 组装NTRIP请求
///
/// 推流请求比拉流多一行 Content-Type。头部顺序与字段取自测站身份，
/// 以便在Caster侧呈现为真实流动站。
pub fn request_line(kind: RequestKind, ep: &Endpoint<'_>, identity: &StationIdentity) -> String {
    let auth = basic_auth(ep.user, ep.pass);
    let profile = identity.profile;
    match kind {
        RequestKind::SourcePull => format!(
            "GET /{} HTTP/1.1\r\nHost: {}\r\nNtrip-Version: {}\r\nUser-Agent: {}\r\nAuthorization: Basic {}\r\nConnection: {}\r\n\r\n",
            ep.mount, ep.host, profile.ntrip_version, identity.user_agent, auth, profile.connection,
        ),
        RequestKind::DestinationPush => format!(
            "POST /{} HTTP/1.1\r\nHost: {}\r\nNtrip-Version: {}\r\nUser-Agent: {}\r\nAuthorization: Basic {}\r\nContent-Type: application/octet-stream\r\nConnection: {}\r\n\r\n",
            ep.mount, ep.host, profile.ntrip_version, identity.user_agent, auth, profile.connection,
        ),
    }
}

/// 读取并判定握手响应
///
/// 5秒内读一行状态行，随后排空余下头部直到空行。状态行包含
/// `200 OK` 或 `ICY 200` 即成功；首读即EOF视为服务器直接断开。
pub async fn read_response<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    timeout(RESPONSE_TIMEOUT, async {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| RelayError::ReadResponse(e.to_string()))?;
        if n == 0 {
            return Err(RelayError::ServerClosed);
        }

        // 排空余下头部，空行或读错即止
        loop {
            let mut l = String::new();
            match reader.read_line(&mut l).await {
                Err(_) | Ok(0) => break,
                Ok(_) => {
                    if l == "\r\n" || l == "\n" {
                        break;
                    }
                }
            }
        }

        if line.contains("200 OK") || line.contains("ICY 200") {
            Ok(())
        } else {
            Err(RelayError::Rejected(line.trim().to_string()))
        }
    })
    .await
    .map_err(|_| RelayError::ReadResponse("i/o timeout".to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn identity() -> StationIdentity {
        StationIdentity::derive("a3f0b1c2d4e5f60718293a4b5c6d7e8f").0
    }

    fn endpoint() -> crate::config::StationConfig {
        crate::config::StationConfig {
            src_host: "caster.example.com".to_string(),
            src_port: 2101,
            src_mount: "RTCM33".to_string(),
            src_user: "user".to_string(),
            src_pass: "pass".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn source_request_framing() {
        let cfg = endpoint();
        let id = identity();
        let req = request_line(RequestKind::SourcePull, &cfg.source(), &id);

        assert!(req.starts_with("GET /RTCM33 HTTP/1.1\r\n"));
        assert!(req.contains("Host: caster.example.com\r\n"));
        assert!(req.contains(&format!("Ntrip-Version: {}\r\n", id.profile.ntrip_version)));
        assert!(req.contains(&format!("User-Agent: {}\r\n", id.user_agent)));
        assert!(req.contains(&format!("Authorization: Basic {}\r\n", basic_auth("user", "pass"))));
        assert!(req.ends_with("\r\n\r\n"));
        assert!(!req.contains("Content-Type"));
    }

    #[test]
    fn destination_request_has_content_type() {
        let cfg = endpoint();
        let id = identity();
        let req = request_line(RequestKind::DestinationPush, &cfg.source(), &id);
        assert!(req.starts_with("POST /RTCM33 HTTP/1.1\r\n"));
        assert!(req.contains("Content-Type: application/octet-stream\r\n"));
    }

    #[test]
    fn basic_auth_is_base64_of_user_colon_pass() {
        // "user:pass" 的标准base64
        assert_eq!(basic_auth("user", "pass"), "dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn accepts_http_200_and_icy_200() {
        for raw in [
            "HTTP/1.1 200 OK\r\nServer: caster\r\n\r\n",
            "ICY 200 OK\r\n\r\n",
        ] {
            let mut reader = BufReader::new(raw.as_bytes());
            assert!(read_response(&mut reader).await.is_ok());
        }
    }

    #[tokio::test]
    async fn rejects_with_status_line() {
        let raw = "HTTP/1.1 401 Unauthorized\r\n\r\n";
        let mut reader = BufReader::new(raw.as_bytes());
        let err = read_response(&mut reader).await.unwrap_err();
        match err {
            RelayError::Rejected(line) => assert_eq!(line, "HTTP/1.1 401 Unauthorized"),
            other => panic!("unexpected: {}", other),
        }
    }

    #[tokio::test]
    async fn immediate_eof_is_server_closed() {
        let mut reader = BufReader::new(&b""[..]);
        let err = read_response(&mut reader).await.unwrap_err();
        assert!(matches!(err, RelayError::ServerClosed));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn streaming_bytes_survive_header_drain() {
        // 头部排空止于空行，后续字节留在reader里
        let raw = b"ICY 200 OK\r\n\r\n\x01\x02\x03".to_vec();
        let mut reader = BufReader::new(&raw[..]);
        read_response(&mut reader).await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, vec![1, 2, 3]);
    }
}
