//! NMEA语句合成模块
//! 构造带校验和的GGA/GSA/RMC语句，模拟流动站上报

use chrono::{DateTime, Datelike, Timelike, Utc};

/// GGA定位质量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixQuality {
    /// 单点定位 (上游静默时)
    Single,
    /// RTK固定解 (上游数据活跃时)
    RtkFixed,
}

impl FixQuality {
    fn code(self) -> u8 {
        match self {
            FixQuality::Single => 1,
            FixQuality::RtkFixed => 4,
        }
    }
}

/// NMEA-0183校验和：$与*之间所有字节的异或
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// 包装payload为完整语句：$<payload>*<HH>\r\n
fn wrap(payload: &str) -> String {
    format!("${}*{:02X}\r\n", payload, checksum(payload))
}

/// 十进制度转NMEA度分格式
///
/// 纬度 DDMM.mmmm,N|S；经度 DDDMM.mmmm,E|W。
pub fn to_deg_min(value: f64, is_lat: bool) -> String {
    let abs = value.abs();
    let deg = abs.floor() as u32;
    let min = (abs - deg as f64) * 60.0;

    if is_lat {
        let dir = if value < 0.0 { "S" } else { "N" };
        format!("{:02}{:07.4},{}", deg, min, dir)
    } else {
        let dir = if value < 0.0 { "W" } else { "E" };
        format!("{:03}{:07.4},{}", deg, min, dir)
    }
}

/// 构造GPGGA语句
///
/// `alt_offset`为海拔扰动 (由调用方的随机源给出，[-0.5, +0.5])。
pub fn gga(
    t: DateTime<Utc>,
    lat: f64,
    lon: f64,
    fix: FixQuality,
    sats: u8,
    hdop: f64,
    alt_offset: f64,
) -> String {
    let alt = 100.0 + alt_offset;
    let payload = format!(
        "GPGGA,{:02}{:02}{:02}.00,{},{},{},{},{:.1},{:.1},M,-5.0,M,,",
        t.hour(),
        t.minute(),
        t.second(),
        to_deg_min(lat, true),
        to_deg_min(lon, false),
        fix.code(),
        sats,
        hdop,
        alt,
    );
    wrap(&payload)
}

/// 构造GPGSA语句：固定卫星号01..12，PDOP/VDOP按HDOP推算
pub fn gsa(hdop: f64) -> String {
    let payload = format!(
        "GPGSA,A,3,01,02,03,04,05,06,07,08,09,10,11,12,{:.1},{:.1},{:.1}",
        hdop * 1.8,
        hdop,
        hdop * 1.5,
    );
    wrap(&payload)
}

/// 构造GPRMC语句：速度/航向置零的最小导航帧
pub fn rmc(t: DateTime<Utc>, lat: f64, lon: f64) -> String {
    let payload = format!(
        "GPRMC,{:02}{:02}{:02}.00,A,{},{},0.0,0.0,{:02}{:02}{:02},,,A",
        t.hour(),
        t.minute(),
        t.second(),
        to_deg_min(lat, true),
        to_deg_min(lon, false),
        t.day(),
        t.month(),
        t.year() % 100,
    );
    wrap(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 12, h, m, s).unwrap()
    }

    /// 校验和与语句尾部的两位十六进制一致
    fn assert_checksum_valid(sentence: &str) {
        assert!(sentence.starts_with('$'));
        assert!(sentence.ends_with("\r\n"));
        let body = &sentence[1..sentence.len() - 2];
        let (payload, cs) = body.split_once('*').unwrap();
        assert_eq!(cs.len(), 2);
        assert_eq!(cs, format!("{:02X}", checksum(payload)));
        assert_eq!(cs, cs.to_uppercase());
    }

    #[test]
    fn deg_min_formatting_boundaries() {
        assert_eq!(to_deg_min(-10.5, true), "1030.0000,S");
        assert_eq!(to_deg_min(106.25, false), "10615.0000,E");
        assert_eq!(to_deg_min(21.0278, true), "2101.6680,N");
        assert_eq!(to_deg_min(-0.5, false), "00030.0000,W");
    }

    #[test]
    fn gga_layout_and_checksum() {
        let s = gga(
            at(8, 30, 5),
            -10.5,
            106.25,
            FixQuality::RtkFixed,
            12,
            0.9,
            0.33,
        );
        assert_checksum_valid(&s);
        assert!(s.starts_with("$GPGGA,083005.00,1030.0000,S,10615.0000,E,4,12,0.9,100.3,M,-5.0,M,,*"));
    }

    #[test]
    fn gga_fix_quality_codes() {
        let single = gga(at(0, 0, 0), 1.0, 1.0, FixQuality::Single, 10, 1.0, 0.0);
        let fixed = gga(at(0, 0, 0), 1.0, 1.0, FixQuality::RtkFixed, 10, 1.0, 0.0);
        assert!(single.contains(",E,1,10,"));
        assert!(fixed.contains(",E,4,10,"));
    }

    #[test]
    fn gsa_dop_multipliers() {
        let s = gsa(1.0);
        assert_checksum_valid(&s);
        // PDOP = HDOP*1.8, VDOP = HDOP*1.5
        assert!(s.starts_with("$GPGSA,A,3,01,02,03,04,05,06,07,08,09,10,11,12,1.8,1.0,1.5*"));
    }

    #[test]
    fn rmc_layout() {
        let s = rmc(at(23, 59, 59), 21.0278, 105.8342);
        assert_checksum_valid(&s);
        assert!(s.starts_with("$GPRMC,235959.00,A,2101.6680,N,10550.0520,E,0.0,0.0,120724,,,A*"));
    }

    #[test]
    fn checksum_is_xor_of_payload() {
        // GP + GGA字段手工异或
        let payload = "GPGGA,000000.00";
        let mut expect = 0u8;
        for b in payload.bytes() {
            expect ^= b;
        }
        assert_eq!(checksum(payload), expect);
    }
}
