use clap::{Arg, Command};
use rusthedge::{
    core::config::{ApiKeys, BinanceEndpoints},
    core::exchange::HedgeExchange,
    exchanges::BinanceFutures,
    strategies::hedge::{HedgeConfig, HedgeNotifier, HedgePositionMonitor},
    utils::init_logger,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载环境变量
    dotenv::dotenv().ok();

    // 解析命令行参数
    let matches = Command::new("RustHedge")
        .version("1.0")
        .about("多空双开对冲交易机器人")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .required(true),
        )
        .get_matches();

    let config_file = matches.get_one::<String>("config").unwrap();

    // 加载并校验策略配置（配置错误直接退出）
    let config = HedgeConfig::from_file(config_file)?;

    // 初始化日志
    init_logger(&config.logging)?;
    log::info!(
        "启动对冲策略: {} with config: {}, 日志级别: {}",
        config.name,
        config_file,
        config.logging.level
    );

    // 初始化钉钉通知器
    let notifier = HedgeNotifier::new(&config.name, &config.notification);
    if notifier.is_enabled() {
        log::info!("✅ 钉钉通知器已初始化");
    } else {
        log::info!("钉钉通知未配置，跳过");
    }

    // 从环境变量加载API密钥并创建交易所适配器
    let api_keys = ApiKeys::from_env("binance")?;
    let endpoints = BinanceEndpoints::futures(config.testnet);
    let exchange = Arc::new(BinanceFutures::new(endpoints, api_keys));

    // 同步服务器时间并加载合约精度规则
    if let Err(e) = exchange.sync_server_time().await {
        log::warn!("⚠️ 时间同步失败: {}，使用本地时间", e);
    }
    let count = exchange.load_instruments().await?;
    log::info!("✅ 已加载 {} 个合约信息", count);

    // 记录启动时账户余额
    match exchange.get_balance_usdt().await {
        Ok(balance) => log::info!("机器人启动时账户余额：{:.2} USDT", balance),
        Err(e) => log::warn!("⚠️ 获取账户余额失败: {}", e),
    }

    // 创建监控器并恢复落盘状态
    let mut monitor = HedgePositionMonitor::new(config, exchange, notifier);
    monitor.restore()?;

    // ctrl-c触发协作式停止：当前tick处理完后退出
    let stop_flag = monitor.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("收到停止信号，正在关闭策略...");
            stop_flag.store(false, Ordering::SeqCst);
        }
    });

    // 运行监控循环直到停止信号或账户级停机
    monitor.run().await;

    log::info!("对冲策略机器人已停止");
    Ok(())
}
