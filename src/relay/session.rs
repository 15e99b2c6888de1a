//! 会话引擎
//! 驱动一次完整的源→目标转发会话：转发主循环 + NMEA心跳 + 目标排空

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::supervisor::StationShared;
use super::{NMEA_WRITE_TIMEOUT, READ_TIMEOUT, WRITE_TIMEOUT};
use crate::common::error::{RelayError, Result};
use crate::connection::{
    dial, read_response, request_line, BufferPool, Conn, RequestKind, BUFFER_SIZE,
};

/// 跑一次完整会话，返回即保证两端连接关闭、辅助任务全部退出
///
/// 错误一律上抛给监督器分类重试，会话内部不做任何恢复。
pub async fn run(shared: &Arc<StationShared>, cancel: &CancellationToken) -> Result<()> {
    // 1. 连接源Caster并握手
    shared.status.set_status("Connecting Source");
    let src_ep = shared.cfg.source();
    let src_conn = dial(cancel, src_ep.host, src_ep.port, src_ep.proxy, src_ep.use_ssl).await?;
    let (src_read, mut src_write) = tokio::io::split(src_conn);

    let request = request_line(RequestKind::SourcePull, &src_ep, &shared.identity);
    src_write
        .write_all(request.as_bytes())
        .await
        .map_err(|e| RelayError::WriteRequest(e.to_string()))?;

    // 源reader整个会话复用：握手后残留在缓冲里的流数据不能丢
    let mut src_reader = BufReader::with_capacity(BUFFER_SIZE, src_read);
    read_response(&mut src_reader).await?;

    // 2. 首条GGA：尚无上游数据，单点解
    let _ = src_write.write_all(shared.primer_gga().as_bytes()).await;

    // 3. 连接目标Caster并握手
    shared.status.set_status("Connecting Dest");
    let dst_ep = shared.cfg.destination();
    let dst_conn = dial(cancel, dst_ep.host, dst_ep.port, dst_ep.proxy, dst_ep.use_ssl).await?;
    let (dst_read, mut dst_write) = tokio::io::split(dst_conn);

    let request = request_line(RequestKind::DestinationPush, &dst_ep, &shared.identity);
    dst_write
        .write_all(request.as_bytes())
        .await
        .map_err(|e| RelayError::WriteRequest(e.to_string()))?;

    let mut dst_reader = BufReader::new(dst_read);
    read_response(&mut dst_reader).await?;

    // 4. 进入流转发状态
    shared.status.set_status("Running");
    shared.status.set_message("Streaming OK".to_string());
    info!(
        "[{}] connected: {} -> {}",
        shared.cfg.id, shared.cfg.src_mount, shared.cfg.dst_mount
    );

    // 辅助任务共享容量1的错误通道，首个错误生效
    let session_token = cancel.child_token();
    let (err_tx, mut err_rx) = mpsc::channel::<RelayError>(1);

    let heartbeat: JoinHandle<()> = tokio::spawn(heartbeat_loop(
        shared.clone(),
        src_write,
        err_tx.clone(),
        session_token.clone(),
    ));
    let drain: JoinHandle<()> = tokio::spawn(drain_loop(
        dst_reader,
        err_tx,
        session_token.clone(),
    ));

    let result = relay_loop(shared, &mut src_reader, &mut dst_write, &mut err_rx, cancel).await;

    // 5. 会话收尾：叫停并等待辅助任务，连接随句柄析构关闭
    session_token.cancel();
    let _ = heartbeat.await;
    let _ = drain.await;

    result
}

/// 转发主循环：源读90秒滚动超时，目标写30秒超时
async fn relay_loop(
    shared: &Arc<StationShared>,
    src_reader: &mut BufReader<ReadHalf<Conn>>,
    dst_write: &mut WriteHalf<Conn>,
    err_rx: &mut mpsc::Receiver<RelayError>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut buf = BufferPool::global().acquire();

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            r = timeout(READ_TIMEOUT, src_reader.read(&mut buf)) => match r {
                Err(_) => return Err(RelayError::ReadSource("i/o timeout".to_string())),
                Ok(Err(e)) => return Err(RelayError::ReadSource(e.to_string())),
                // 流中途EOF走短会话判定，与握手阶段的直接断开区别对待
                Ok(Ok(0)) => return Err(RelayError::ReadSource("connection closed".to_string())),
                Ok(Ok(n)) => n,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            r = timeout(WRITE_TIMEOUT, dst_write.write_all(&buf[..n])) => match r {
                Err(_) => return Err(RelayError::WriteDest("i/o timeout".to_string())),
                Ok(Err(e)) => return Err(RelayError::WriteDest(e.to_string())),
                Ok(Ok(())) => {}
            },
        }

        // 计数在目标写成功之后，last_data随每个上游字节前进
        shared.status.add_bytes(n as u64);
        shared.touch_last_data();

        // 非阻塞地收辅助任务的错误与取消信号
        if let Ok(err) = err_rx.try_recv() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
    }
}

/// 心跳任务：按带抖动的间隔向源回发NMEA
async fn heartbeat_loop(
    shared: Arc<StationShared>,
    mut src_write: WriteHalf<Conn>,
    err_tx: mpsc::Sender<RelayError>,
    token: CancellationToken,
) {
    loop {
        let interval = shared.next_heartbeat_interval();
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let has_recent_data = shared.has_recent_data();
        let bundle = shared.nmea_bundle(has_recent_data);

        match timeout(NMEA_WRITE_TIMEOUT, src_write.write_all(bundle.as_bytes())).await {
            Err(_) => {
                let _ = err_tx.try_send(RelayError::NmeaWrite("i/o timeout".to_string()));
                return;
            }
            Ok(Err(e)) => {
                let _ = err_tx.try_send(RelayError::NmeaWrite(e.to_string()));
                return;
            }
            Ok(Ok(())) => {}
        }

        // 心跳发送成功也算活跃：短暂的上游静默不掉出RTK固定解
        if has_recent_data {
            shared.touch_last_data();
        }
    }
}

/// 目标排空任务：目标通常不回发数据，这里纯当存活探针用
async fn drain_loop(
    mut dst_reader: BufReader<ReadHalf<Conn>>,
    err_tx: mpsc::Sender<RelayError>,
    token: CancellationToken,
) {
    let mut buf = BufferPool::global().acquire();
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            r = dst_reader.read(&mut buf) => match r {
                Ok(n) if n > 0 => {
                    // 个别Caster会回ACK之类的字节，读掉即可
                    debug!("dest sent {} bytes, discarded", n);
                }
                Ok(_) => {
                    let _ = err_tx.try_send(RelayError::DestClosed("eof".to_string()));
                    return;
                }
                Err(e) => {
                    let _ = err_tx.try_send(RelayError::DestClosed(e.to_string()));
                    return;
                }
            }
        }
    }
}
