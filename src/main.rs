//! NTRIP 中继服务入口

use clap::Parser;
use tracing::info;

/// NTRIP 中继服务配置参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 测站配置文件路径 (JSON数组)
    #[arg(short, long, default_value = "config.json", env = "NTRIP_RELAY_CONFIG")]
    config: String,

    /// 管理接口监听地址
    #[arg(long, default_value = "0.0.0.0:8081", env = "NTRIP_RELAY_ADMIN")]
    admin_addr: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        ntrip_relay::init();
        info!("NTRIP relay starting with config: {}", args.config);

        ntrip_relay::run(&args.config, &args.admin_addr).await?;
        Ok(())
    })
}
