//! 测站配置模块
//! JSON数组格式的测站清单：加载、持久化与内容指纹

use std::fs;
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::common::error::{RelayError, Result};

/// 单个测站的配置快照
///
/// 字段与磁盘上的JSON条目一一对应，未知字段忽略，缺省字段取零值。
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    /// 测站ID (唯一)
    pub id: String,
    /// 是否启用
    pub enable: bool,
    /// 源Caster主机
    pub src_host: String,
    /// 源Caster端口
    pub src_port: u16,
    /// 源挂载点
    pub src_mount: String,
    /// 源用户名
    pub src_user: String,
    /// 源密码
    pub src_pass: String,
    /// 源SOCKS5代理 (空为直连)
    pub src_proxy: String,
    /// 源连接启用TLS
    pub src_use_ssl: bool,
    /// 目标Caster主机
    pub dst_host: String,
    /// 目标Caster端口
    pub dst_port: u16,
    /// 目标挂载点
    pub dst_mount: String,
    /// 目标用户名
    pub dst_user: String,
    /// 目标密码
    pub dst_pass: String,
    /// 目标SOCKS5代理
    pub dst_proxy: String,
    /// 目标连接启用TLS
    pub dst_use_ssl: bool,
    /// 参考纬度
    pub lat: f64,
    /// 参考经度
    pub lon: f64,
}

/// 连接端点视图：源端和目标端共用同一套拨号/握手逻辑
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub mount: &'a str,
    pub user: &'a str,
    pub pass: &'a str,
    pub proxy: &'a str,
    pub use_ssl: bool,
}

impl StationConfig {
    /// 源端点视图
    pub fn source(&self) -> Endpoint<'_> {
        Endpoint {
            host: &self.src_host,
            port: self.src_port,
            mount: &self.src_mount,
            user: &self.src_user,
            pass: &self.src_pass,
            proxy: &self.src_proxy,
            use_ssl: self.src_use_ssl,
        }
    }

    /// 目标端点视图
    pub fn destination(&self) -> Endpoint<'_> {
        Endpoint {
            host: &self.dst_host,
            port: self.dst_port,
            mount: &self.dst_mount,
            user: &self.dst_user,
            pass: &self.dst_pass,
            proxy: &self.dst_proxy,
            use_ssl: self.dst_use_ssl,
        }
    }

    /// 配置指纹：序列化内容的MD5十六进制串
    ///
    /// 指纹是"配置是否变化"的唯一判据，任何字段变动都会改变指纹。
    pub fn fingerprint(&self) -> String {
        // 字段顺序固定，序列化结果稳定
        let data = serde_json::to_vec(self).expect("station config is always serializable");
        let mut hasher = Md5::new();
        hasher.update(&data);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for b in digest {
            use std::fmt::Write;
            let _ = write!(out, "{:02x}", b);
        }
        out
    }
}

/// 解析配置字节为测站清单
pub fn parse(data: &[u8]) -> Result<Vec<StationConfig>> {
    serde_json::from_slice(data).map_err(|e| RelayError::ConfigParse(e.to_string()))
}

/// 从磁盘加载测站清单
pub fn load(path: impl AsRef<Path>) -> Result<Vec<StationConfig>> {
    let data = fs::read(path.as_ref()).map_err(|e| RelayError::ConfigIo(e.to_string()))?;
    parse(&data)
}

/// 原子化持久化测站清单：写临时文件后rename替换
pub fn save(path: impl AsRef<Path>, stations: &[StationConfig]) -> Result<()> {
    let path = path.as_ref();
    let data = serde_json::to_vec_pretty(stations)
        .map_err(|e| RelayError::ConfigParse(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &data).map_err(|e| RelayError::ConfigIo(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| RelayError::ConfigIo(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StationConfig {
        StationConfig {
            id: "VRS-42".to_string(),
            enable: true,
            src_host: "caster.example.com".to_string(),
            src_port: 2101,
            src_mount: "RTCM33".to_string(),
            src_user: "user".to_string(),
            src_pass: "pass".to_string(),
            dst_host: "push.example.com".to_string(),
            dst_port: 2101,
            dst_mount: "OUT01".to_string(),
            lat: 21.0278,
            lon: 105.8342,
            ..StationConfig::default()
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        // 同一配置多次计算指纹必须一致
        let cfg = sample();
        assert_eq!(cfg.fingerprint(), cfg.fingerprint());
        assert_eq!(cfg.fingerprint().len(), 32);
    }

    #[test]
    fn fingerprint_tracks_any_field_change() {
        let a = sample();
        let mut b = sample();
        b.lat += 0.0001;
        assert_ne!(a.fingerprint(), b.fingerprint());

        let mut c = sample();
        c.src_pass = "other".to_string();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn parse_ignores_unknown_and_defaults_missing() {
        // 未知字段忽略、缺省字段取零值
        let raw = br#"[{"id":"A","enable":true,"src_host":"h","note":"extra"}]"#;
        let list = parse(raw).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "A");
        assert_eq!(list[0].src_port, 0);
        assert!(!list[0].src_use_ssl);
        assert_eq!(list[0].dst_proxy, "");
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(matches!(
            parse(b"{not json"),
            Err(RelayError::ConfigParse(_))
        ));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let stations = vec![sample()];
        save(&path, &stations).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, stations);

        // 替换是原子rename，不留临时文件
        assert!(!dir.path().join("config.json.tmp").exists());
    }
}
