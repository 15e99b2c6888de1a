//! 设备身份模块
//! 按配置指纹确定性分配GNSS流动站设备档案与User-Agent

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// User-Agent版本号模板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTemplate {
    /// 形如 1.4.11
    MajorMinorPatch,
    /// 形如 v2.23.0
    VMajorMinorPatch,
    /// 形如 5.51 (Trimble风格)
    MajorMinor,
    /// 形如 7.6.0.20240712
    MajorMinorPatchDate,
}

/// 设备档案：一种市售GNSS流动站的行为画像
///
/// 档案表只读，进程内共享。
#[derive(Debug)]
pub struct DeviceProfile {
    /// 设备名 (不含版本号)
    pub device_name: &'static str,
    /// 版本号模板
    pub version_template: VersionTemplate,
    /// NTRIP协议版本头
    pub ntrip_version: &'static str,
    /// Connection头
    pub connection: &'static str,
    /// NMEA发送间隔
    pub nmea_interval: Duration,
    /// NMEA间隔抖动幅度
    pub nmea_jitter: Duration,
    /// HDOP取值范围 [min, max]
    pub hdop_range: (f64, f64),
    /// 卫星数取值范围 [min, max]
    pub sats_range: (u8, u8),
    /// 是否发送GSA语句
    pub send_gsa: bool,
    /// 是否发送RMC语句
    pub send_rmc: bool,
    /// 首次连接前的静默期
    pub initial_delay: Duration,
}

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// 市售GNSS流动站设备档案表
pub static DEVICE_PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        device_name: "GNSSInternetRadio",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(10),
        nmea_jitter: secs(2),
        hdop_range: (0.8, 1.2),
        sats_range: (10, 14),
        send_gsa: true,
        send_rmc: false,
        initial_delay: secs(0),
    },
    DeviceProfile {
        device_name: "EFIX eField",
        version_template: VersionTemplate::MajorMinorPatchDate,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(12),
        nmea_jitter: secs(3),
        hdop_range: (0.7, 1.0),
        sats_range: (12, 16),
        send_gsa: true,
        send_rmc: true,
        initial_delay: secs(1),
    },
    DeviceProfile {
        device_name: "CHC LandStar",
        version_template: VersionTemplate::MajorMinorPatchDate,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(11),
        nmea_jitter: secs(2),
        hdop_range: (0.9, 1.3),
        sats_range: (9, 13),
        send_gsa: false,
        send_rmc: true,
        initial_delay: secs(0),
    },
    DeviceProfile {
        device_name: "CHC i83",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(15),
        nmea_jitter: secs(4),
        hdop_range: (0.8, 1.4),
        sats_range: (10, 15),
        send_gsa: true,
        send_rmc: false,
        initial_delay: secs(2),
    },
    DeviceProfile {
        device_name: "COMNAV T300",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(9),
        nmea_jitter: secs(1),
        hdop_range: (0.7, 1.1),
        sats_range: (11, 15),
        send_gsa: false,
        send_rmc: false,
        initial_delay: secs(1),
    },
    DeviceProfile {
        device_name: "Trimble DA2",
        version_template: VersionTemplate::MajorMinor,
        ntrip_version: "Ntrip/1.0",
        connection: "keep-alive",
        nmea_interval: secs(10),
        nmea_jitter: secs(2),
        hdop_range: (0.6, 0.9),
        sats_range: (12, 18),
        send_gsa: true,
        send_rmc: true,
        initial_delay: secs(0),
    },
    DeviceProfile {
        device_name: "Hi-Target V90",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(13),
        nmea_jitter: secs(3),
        hdop_range: (0.8, 1.2),
        sats_range: (10, 14),
        send_gsa: false,
        send_rmc: true,
        initial_delay: secs(1),
    },
    DeviceProfile {
        device_name: "South S82T",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(11),
        nmea_jitter: secs(2),
        hdop_range: (0.9, 1.3),
        sats_range: (9, 13),
        send_gsa: true,
        send_rmc: false,
        initial_delay: secs(0),
    },
    DeviceProfile {
        device_name: "Stonex S900A",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(14),
        nmea_jitter: secs(3),
        hdop_range: (0.8, 1.4),
        sats_range: (10, 14),
        send_gsa: false,
        send_rmc: false,
        initial_delay: secs(2),
    },
    DeviceProfile {
        device_name: "UniStrong G970",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(10),
        nmea_jitter: secs(2),
        hdop_range: (0.7, 1.1),
        sats_range: (11, 15),
        send_gsa: true,
        send_rmc: true,
        initial_delay: secs(1),
    },
    DeviceProfile {
        device_name: "Emlid ReachRS2",
        version_template: VersionTemplate::VMajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "close",
        nmea_interval: secs(12),
        nmea_jitter: secs(2),
        hdop_range: (0.8, 1.1),
        sats_range: (11, 14),
        send_gsa: false,
        send_rmc: false,
        initial_delay: secs(1),
    },
    DeviceProfile {
        device_name: "Leica GS18",
        version_template: VersionTemplate::MajorMinorPatch,
        ntrip_version: "Ntrip/2.0",
        connection: "keep-alive",
        nmea_interval: secs(11),
        nmea_jitter: secs(3),
        hdop_range: (0.6, 0.9),
        sats_range: (13, 18),
        send_gsa: true,
        send_rmc: true,
        initial_delay: secs(0),
    },
];

/// 测站身份：由配置指纹一次性派生，测站存续期内不变
#[derive(Debug)]
pub struct StationIdentity {
    /// 设备档案
    pub profile: &'static DeviceProfile,
    /// 完整User-Agent (设备名/版本号)
    pub user_agent: String,
    /// 固定HDOP
    pub hdop: f64,
    /// 固定卫星数
    pub sats: u8,
}

impl StationIdentity {
    /// 从配置指纹派生测站身份，返回身份与派生后的随机数发生器
    ///
    /// 取指纹前8个十六进制字符：字节和对档案表长度取模选档案；
    /// 字节按位次左移8·j位打包成64位种子。同一指纹派生结果恒定。
    pub fn derive(fingerprint: &str) -> (Self, StdRng) {
        let prefix: &[u8] = fingerprint.as_bytes();
        let prefix = &prefix[..prefix.len().min(8)];

        let idx: usize = prefix.iter().map(|&b| b as usize).sum::<usize>() % DEVICE_PROFILES.len();
        let profile = &DEVICE_PROFILES[idx];

        let seed = prefix
            .iter()
            .enumerate()
            .fold(0u64, |acc, (j, &b)| acc.wrapping_add((b as u64) << (8 * j)));
        let mut rng = StdRng::seed_from_u64(seed);

        let hdop = rng.gen_range(profile.hdop_range.0..=profile.hdop_range.1);
        let sats = rng.gen_range(profile.sats_range.0..=profile.sats_range.1);
        let user_agent = format!(
            "{}/{}",
            profile.device_name,
            generate_version(profile.version_template, &mut rng)
        );

        (
            Self {
                profile,
                user_agent,
                hdop,
                sats,
            },
            rng,
        )
    }
}

/// 按模板生成版本号
fn generate_version(template: VersionTemplate, rng: &mut StdRng) -> String {
    match template {
        VersionTemplate::MajorMinorPatch => {
            let major = rng.gen_range(1..=8);
            let minor = rng.gen_range(0..=9);
            let patch = rng.gen_range(0..=19);
            format!("{}.{}.{}", major, minor, patch)
        }
        VersionTemplate::VMajorMinorPatch => {
            let major = rng.gen_range(1..=4);
            let minor = rng.gen_range(0..=29);
            let patch = rng.gen_range(0..=9);
            format!("v{}.{}.{}", major, minor, patch)
        }
        VersionTemplate::MajorMinor => {
            let major = rng.gen_range(3..=10);
            let minor = rng.gen_range(1..=99);
            format!("{}.{}", major, minor)
        }
        VersionTemplate::MajorMinorPatchDate => {
            let major = rng.gen_range(5..=9);
            let minor = rng.gen_range(0..=9);
            let patch = rng.gen_range(0..=4);
            let year = rng.gen_range(2023..=2024);
            let month = rng.gen_range(1..=12);
            let day = rng.gen_range(1..=28);
            format!(
                "{}.{}.{}.{:04}{:02}{:02}",
                major, minor, patch, year, month, day
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP: &str = "a3f0b1c2d4e5f60718293a4b5c6d7e8f";

    #[test]
    fn derivation_is_deterministic() {
        // 相同指纹在任意时刻派生结果一致
        let (a, _) = StationIdentity::derive(FP);
        let (b, _) = StationIdentity::derive(FP);
        assert_eq!(a.user_agent, b.user_agent);
        assert_eq!(a.hdop, b.hdop);
        assert_eq!(a.sats, b.sats);
        assert!(std::ptr::eq(a.profile, b.profile));
    }

    #[test]
    fn profile_index_is_byte_sum_mod_table_len() {
        let prefix = &FP.as_bytes()[..8];
        let expected = prefix.iter().map(|&b| b as usize).sum::<usize>() % DEVICE_PROFILES.len();
        let (identity, _) = StationIdentity::derive(FP);
        assert!(std::ptr::eq(identity.profile, &DEVICE_PROFILES[expected]));
    }

    #[test]
    fn sampled_values_stay_in_profile_range() {
        let (identity, _) = StationIdentity::derive(FP);
        let p = identity.profile;
        assert!(identity.hdop >= p.hdop_range.0 && identity.hdop <= p.hdop_range.1);
        assert!(identity.sats >= p.sats_range.0 && identity.sats <= p.sats_range.1);
    }

    #[test]
    fn user_agent_matches_template_shape() {
        // 各模板生成的版本号段数和前缀
        let mut rng = StdRng::seed_from_u64(7);
        let v = generate_version(VersionTemplate::MajorMinorPatch, &mut rng);
        assert_eq!(v.split('.').count(), 3);

        let v = generate_version(VersionTemplate::VMajorMinorPatch, &mut rng);
        assert!(v.starts_with('v'));
        assert_eq!(v.split('.').count(), 3);

        let v = generate_version(VersionTemplate::MajorMinor, &mut rng);
        assert_eq!(v.split('.').count(), 2);

        let v = generate_version(VersionTemplate::MajorMinorPatchDate, &mut rng);
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 8);
        let date: u32 = parts[3].parse().unwrap();
        assert!((2023_01_01..=2024_12_28).contains(&date));
    }

    #[test]
    fn different_fingerprints_can_differ() {
        // 不是强保证，但这两个指纹的种子不同，派生应不同
        let (a, _) = StationIdentity::derive("00000000ffffffffffffffffffffffff");
        let (b, _) = StationIdentity::derive("ffffffff00000000ffffffffffffffff");
        assert!(a.user_agent != b.user_agent || a.hdop != b.hdop || a.sats != b.sats);
    }
}
