use anyhow::{Context, Result};
use clap::{Arg, Command};
use scheduler_core::{init_logging, AppConfig, LogFormat};
use tokio::signal;
use tracing::{error, info};
use trigger_scheduler::{Application, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("trigger-scheduler")
        .version("1.0.0")
        .about("触发器驱动的集群任务调度引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时查找 config/scheduler.toml"),
        )
        .arg(
            Arg::new("tasks")
                .short('t')
                .long("tasks")
                .value_name("FILE")
                .help("启动时注册的任务清单（TOML）"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {config_path:?}"))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse::<LogFormat>().map_err(anyhow::Error::msg)?;
    }

    init_logging(&config.logging)?;
    info!("启动任务调度节点: {}", config.scheduler.node_id);

    let app = Application::new(config).await?;
    if let Some(tasks) = matches.get_one::<String>("tasks") {
        app.load_tasks(tasks).await?;
    }

    let started = app.start().await;
    if started == 0 {
        error!("没有调度器启动成功");
    }

    let shutdown_manager = ShutdownManager::new();
    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    shutdown_manager
        .graceful_shutdown(async {
            app.stop().await;
        })
        .await;

    info!("任务调度节点已退出");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
