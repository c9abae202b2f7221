//! Nook Spooler - 小票打印队列服务
//!
//! # 架构概述
//!
//! - **打印** (`printing`): 小票渲染, 持久化队列, 后台工作者, 生产者 API
//! - **核心** (`core`): 配置, 服务状态, 后台任务
//! - **工具** (`utils`): 日志
//!
//! 底层 ESC/POS 与传输由 `nook-printer` 提供。
//!
//! # 数据流
//!
//! ```text
//! session closed -> ReceiptData -> submit_receipt -> PrintJobQueue (redb)
//!                                                         |
//!                    printer <- ReliableTransmitter <- QueueWorker -> ReceiptEncoder
//! ```

pub mod core;
pub mod printing;
pub mod utils;

// Re-export 公共类型
pub use self::core::{BackgroundTasks, Config, SpoolerState};
pub use printing::{
    JobCorrelation, JobStatus, JobStatusView, PrintJob, PrintJobQueue, ReceiptData,
    ReceiptEncoder, ReceiptPrintService,
};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// Load `.env`, then install the logger from the resulting environment
pub fn setup_environment() -> Config {
    // .env is optional
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    );
    config
}

pub fn print_banner() {
    println!(
        r#"
  _  _             _
 | \| |___  ___  | |__
 | .` / _ \/ _ \ | / /
 |_|\_\___/\___/ |_\_\  spooler
    "#
    );
}
