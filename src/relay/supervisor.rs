//! 测站监督器
//! 以无限重试循环驱动会话，按失败类别选择退避策略

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session;
use super::status::StationStatus;
use super::{
    BLOCK_RETRY_DELAY, MAX_RETRY_BACKOFF, MIN_STABLE_SESSION, NORMAL_RETRY_DELAY,
    RECENT_DATA_WINDOW, SHORT_SESSION_DELAY,
};
use crate::common::device::StationIdentity;
use crate::common::error::RelayError;
use crate::common::nmea;
use crate::config::StationConfig;

/// 监督器与其会话任务共享的测站状态
pub struct StationShared {
    /// 配置快照
    pub cfg: StationConfig,
    /// 配置指纹 (管理器用于判定重启)
    pub fingerprint: String,
    /// 派生的设备身份，监督器存续期内不变
    pub identity: StationIdentity,
    /// 可观测状态
    pub status: StationStatus,
    /// 最近一次收到上游数据的unix秒
    last_data: AtomicI64,
    /// 测站专属随机源 (种子来自指纹，抖动/扰动共用)
    rng: Mutex<StdRng>,
}

impl StationShared {
    /// 记录上游数据到达时刻
    pub fn touch_last_data(&self) {
        self.last_data.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// 30秒窗口内是否收到过上游数据
    pub fn has_recent_data(&self) -> bool {
        Utc::now().timestamp() - self.last_data.load(Ordering::Relaxed) < RECENT_DATA_WINDOW
    }

    /// 下一次心跳间隔：基准间隔加减随机抖动，每个tick重新取值
    pub fn next_heartbeat_interval(&self) -> Duration {
        let profile = self.identity.profile;
        let jitter = profile.nmea_jitter.as_millis() as i64;
        if jitter == 0 {
            return profile.nmea_interval;
        }
        let delta = self.rng.lock().gen_range(-jitter..=jitter);
        let base = profile.nmea_interval.as_millis() as i64;
        Duration::from_millis((base + delta).max(0) as u64)
    }

    /// 组装一轮心跳要发送的NMEA语句
    ///
    /// GGA必发；GSA概率1/3、RMC概率1/4按档案追加。
    pub fn nmea_bundle(&self, has_recent_data: bool) -> String {
        let now = Utc::now();
        let fix = if has_recent_data {
            nmea::FixQuality::RtkFixed
        } else {
            nmea::FixQuality::Single
        };

        let mut rng = self.rng.lock();
        let alt_offset = rng.gen::<f64>() - 0.5;
        let mut out = nmea::gga(
            now,
            self.cfg.lat,
            self.cfg.lon,
            fix,
            self.identity.sats,
            self.identity.hdop,
            alt_offset,
        );
        if self.identity.profile.send_gsa && rng.gen_range(0..3) == 0 {
            out.push_str(&nmea::gsa(self.identity.hdop));
        }
        if self.identity.profile.send_rmc && rng.gen_range(0..4) == 0 {
            out.push_str(&nmea::rmc(now, self.cfg.lat, self.cfg.lon));
        }
        out
    }

    /// 握手后立即发送的首条GGA (还没有上游数据，单点解)
    pub fn primer_gga(&self) -> String {
        let alt_offset = self.rng.lock().gen::<f64>() - 0.5;
        nmea::gga(
            Utc::now(),
            self.cfg.lat,
            self.cfg.lon,
            nmea::FixQuality::Single,
            self.identity.sats,
            self.identity.hdop,
            alt_offset,
        )
    }

    /// 随机量：延迟加抖动等处复用测站随机源
    fn rand_millis(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..bound)
    }

    fn rand_bool(&self) -> bool {
        self.rng.lock().gen_bool(0.5)
    }
}

/// 测站监督器句柄：持有取消令牌和后台任务
pub struct StationSupervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    pub shared: Arc<StationShared>,
}

impl StationSupervisor {
    /// 派生身份并启动监督循环
    pub fn spawn(cfg: StationConfig, order: usize) -> Self {
        let fingerprint = cfg.fingerprint();
        let (identity, rng) = StationIdentity::derive(&fingerprint);
        info!(
            "[{}] worker initialized (device: {}, hdop: {:.2}, sats: {})",
            cfg.id, identity.user_agent, identity.hdop, identity.sats
        );

        let shared = Arc::new(StationShared {
            status: StationStatus::new(cfg.id.clone(), order),
            cfg,
            fingerprint,
            identity,
            last_data: AtomicI64::new(0),
            rng: Mutex::new(rng),
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(shared.clone(), cancel.clone()));
        Self {
            cancel,
            handle,
            shared,
        }
    }

    /// 取消并等待监督器完全退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

/// 监督循环：启动静默期 + 永久重试
async fn run_loop(shared: Arc<StationShared>, cancel: CancellationToken) {
    shared.status.mark_started();

    // 启动静默期：各测站错峰发起首连
    let initial_delay = shared.identity.profile.initial_delay;
    if initial_delay > Duration::ZERO {
        let delay = initial_delay + Duration::from_millis(shared.rand_millis(3000));
        shared
            .status
            .set_status(&format!("Waiting {:.1}s", delay.as_secs_f64()));
        tokio::select! {
            _ = cancel.cancelled() => {
                shared.status.set_status("Stopped");
                return;
            }
            _ = sleep(delay) => {}
        }
    }

    let mut retry_count: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            shared.status.set_status("Stopped");
            return;
        }

        let session_start = Instant::now();
        let result = session::run(&shared, &cancel).await;
        let run_duration = session_start.elapsed();

        match result {
            Err(err) if err.is_cancelled() => {
                shared.status.set_status("Stopped");
                return;
            }
            Err(err) => {
                shared.status.set_status("Error");
                let (delay, annotation) = next_retry(&err, run_duration, &mut retry_count);
                shared.status.set_message(format!("{} {}", err, annotation));

                if run_duration < MIN_STABLE_SESSION {
                    warn!(
                        "[{}] short session detected: {:.1}s (expected >60s), possible bad credentials, missing mount or network issue",
                        shared.cfg.id,
                        run_duration.as_secs_f64()
                    );
                }
                warn!(
                    "[{}] error: {}. retry in {:?}",
                    shared.cfg.id, err, delay
                );

                let delay = apply_jitter(&shared, delay);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        shared.status.set_status("Stopped");
                        return;
                    }
                    _ = sleep(delay) => {}
                }
            }
            Ok(()) => {
                if run_duration >= MIN_STABLE_SESSION {
                    retry_count = 0;
                    info!(
                        "[{}] session completed after {:.1}s",
                        shared.cfg.id,
                        run_duration.as_secs_f64()
                    );
                }
            }
        }
    }
}

/// 按失败类别选择下一次重试间隔与状态注记
///
/// 判定顺序：封锁类 → 短会话 → 瞬时类 → 未知，首个命中生效。
pub(crate) fn next_retry(
    err: &RelayError,
    run_duration: Duration,
    retry_count: &mut u32,
) -> (Duration, String) {
    if err.is_permanent() {
        *retry_count += 1;
        (BLOCK_RETRY_DELAY, "(Server Block - Wait 30s)".to_string())
    } else if run_duration < MIN_STABLE_SESSION {
        *retry_count += 1;
        (
            SHORT_SESSION_DELAY,
            format!(
                "(Unstable - Session {:.0}s < 60s - Wait 20s)",
                run_duration.as_secs_f64()
            ),
        )
    } else if err.is_temporary() {
        let n = (*retry_count).max(1);
        let secs = NORMAL_RETRY_DELAY
            .as_secs()
            .saturating_mul(1u64 << (n - 1).min(16))
            .min(MAX_RETRY_BACKOFF.as_secs());
        *retry_count += 1;
        (
            Duration::from_secs(secs),
            format!("(Network - Backoff {}s)", secs),
        )
    } else {
        *retry_count += 1;
        let secs = (NORMAL_RETRY_DELAY.as_secs() * *retry_count as u64)
            .min(MAX_RETRY_BACKOFF.as_secs());
        (
            Duration::from_secs(secs),
            format!("(Unknown - Retry {})", retry_count),
        )
    }
}

/// 重试间隔加减10%以内的随机抖动
fn apply_jitter(shared: &StationShared, delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let span = ms / 10;
    if span == 0 {
        return delay;
    }
    let jitter = shared.rand_millis(span);
    if shared.rand_bool() {
        Duration::from_millis(ms + jitter)
    } else {
        Duration::from_millis(ms - jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn short_session_waits_twenty_seconds() {
        // 59秒短会话 (非封锁类错误) → 固定20秒
        let mut retries = 0;
        let err = RelayError::WriteDest("broken pipe".to_string());
        let (delay, msg) = next_retry(&err, secs(59), &mut retries);
        assert_eq!(delay, secs(20));
        assert!(msg.contains("Unstable - Session 59s < 60s"));
        assert_eq!(retries, 1);
    }

    #[test]
    fn temporary_error_backs_off_exponentially() {
        // 61秒会话 + timeout + 已重试3次 → min(5·2^2, 60) = 20秒
        let mut retries = 3;
        let err = RelayError::ReadSource("i/o timeout".to_string());
        let (delay, msg) = next_retry(&err, secs(61), &mut retries);
        assert_eq!(delay, secs(20));
        assert!(msg.contains("Network - Backoff 20s"));
        assert_eq!(retries, 4);
    }

    #[test]
    fn backoff_caps_at_sixty_seconds() {
        let mut retries = 10;
        let err = RelayError::ReadSource("i/o timeout".to_string());
        let (delay, _) = next_retry(&err, secs(61), &mut retries);
        assert_eq!(delay, secs(60));
    }

    #[test]
    fn first_temporary_error_waits_base_delay() {
        let mut retries = 0;
        let err = RelayError::ProxyDialTimeout;
        let (delay, _) = next_retry(&err, secs(61), &mut retries);
        assert_eq!(delay, secs(5));
    }

    #[test]
    fn permanent_error_is_server_block() {
        // 封锁类优先于短会话判定
        let mut retries = 0;
        let err = RelayError::Rejected("HTTP/1.1 403 Forbidden".to_string());
        let (delay, msg) = next_retry(&err, secs(61), &mut retries);
        assert_eq!(delay, secs(30));
        assert!(msg.contains("Server Block - Wait 30s"));

        let (delay, msg) = next_retry(&err, secs(3), &mut retries);
        assert_eq!(delay, secs(30));
        assert!(msg.contains("Server Block"));
        assert_eq!(retries, 2);
    }

    #[test]
    fn unknown_error_scales_linearly() {
        let mut retries = 2;
        let err = RelayError::ConfigIo("odd".to_string());
        let (delay, msg) = next_retry(&err, secs(100), &mut retries);
        assert_eq!(delay, secs(15));
        assert!(msg.contains("Unknown - Retry 3"));

        let mut retries = 40;
        let (delay, _) = next_retry(&err, secs(100), &mut retries);
        assert_eq!(delay, secs(60));
    }

    /// 构造共享状态而不启动后台任务
    fn test_shared(cfg: StationConfig) -> StationShared {
        let fingerprint = cfg.fingerprint();
        let (identity, rng) = StationIdentity::derive(&fingerprint);
        StationShared {
            status: StationStatus::new(cfg.id.clone(), 0),
            cfg,
            fingerprint,
            identity,
            last_data: AtomicI64::new(0),
            rng: Mutex::new(rng),
        }
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let shared = test_shared(StationConfig {
            id: "J1".to_string(),
            ..Default::default()
        });
        for _ in 0..50 {
            let jittered = apply_jitter(&shared, secs(20));
            assert!(jittered >= Duration::from_millis(18_000));
            assert!(jittered <= Duration::from_millis(22_000));
        }
    }

    #[test]
    fn recent_data_window_boundary() {
        let shared = test_shared(StationConfig::default());
        // 初始无数据 → 非活跃
        assert!(!shared.has_recent_data());

        // 29秒前有数据 → 活跃；整30秒 → 非活跃
        shared
            .last_data
            .store(Utc::now().timestamp() - 29, Ordering::Relaxed);
        assert!(shared.has_recent_data());
        shared
            .last_data
            .store(Utc::now().timestamp() - 30, Ordering::Relaxed);
        assert!(!shared.has_recent_data());
    }

    #[test]
    fn heartbeat_interval_within_jitter_band() {
        let shared = test_shared(StationConfig {
            id: "H1".to_string(),
            ..Default::default()
        });
        let p = shared.identity.profile;
        for _ in 0..50 {
            let interval = shared.next_heartbeat_interval();
            assert!(interval >= p.nmea_interval.saturating_sub(p.nmea_jitter));
            assert!(interval <= p.nmea_interval + p.nmea_jitter);
        }
    }
}
