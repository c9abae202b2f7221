use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use nook_printer::{
    Charset, DiscoveryConfig, ErrorCorrection, SymbolConfig, SymbolModel, TransmitPolicy,
};

use crate::printing::{ReceiptEncoder, WorkerSettings};

/// Spooler configuration
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./nook-data | 工作目录 (队列数据库, fallback 文件) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志目录 (不设置则输出到终端) |
/// | LOG_JSON | false | JSON 格式日志 |
/// | PAPER_WIDTH | 32 | 每行字符数 (58mm=32, 80mm=48) |
/// | DISPLAY_TIMEZONE | UTC | 小票时间显示时区 |
/// | PRINTER_CHARSET | latin | latin / gbk |
/// | PRINTER_NAME | - | 精确的打印队列名或蓝牙设备名片段 |
/// | DEVICE_DIR | /dev | 设备节点目录 |
/// | QR_MODEL | 2 | 二维码模型 (1/2) |
/// | QR_MODULE_SIZE | 6 | 模块大小 (1-16) |
/// | QR_ECC | M | 纠错级别 (L/M/Q/H) |
/// | WORKER_POLL_MS | 2000 | 队列空闲轮询间隔 |
/// | RETRY_SCAN_SECS | 60 | 自动重试扫描间隔 |
/// | MAX_AUTO_RETRIES | 3 | 自动重试上限 |
/// | SWEEP_INTERVAL_SECS | 3600 | 清理间隔 |
/// | RETENTION_DAYS | 7 | 已完成/失败任务保留天数 |
/// | TRANSMIT_ATTEMPTS | 3 | 每次发送尝试次数 |
/// | TRANSMIT_BACKOFF_MS | 2000 | 尝试间隔 |
/// | BUSINESS_NAME | Study Nook | 默认店名 |
/// | CLOSING_MESSAGE | Thank you! | 默认结束语 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/var/lib/nook PRINTER_NAME=RPP02N nook-spooler run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub log_json: bool,

    // === 小票排版 ===
    pub paper_width: usize,
    pub display_timezone: Tz,
    pub charset: Charset,
    pub symbol: SymbolConfig,
    pub business_name: String,
    pub closing_message: String,

    // === 打印机发现 ===
    pub printer_name: Option<String>,
    pub device_dir: String,

    // === 队列与重试 ===
    pub worker_poll_ms: u64,
    pub retry_scan_secs: u64,
    pub max_auto_retries: u32,
    pub sweep_interval_secs: u64,
    pub retention_days: u64,
    pub transmit_attempts: u32,
    pub transmit_backoff_ms: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./nook-data".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: non_empty_var("LOG_DIR"),
            log_json: env_or("LOG_JSON", false),

            paper_width: env_or("PAPER_WIDTH", 32),
            display_timezone: env_or("DISPLAY_TIMEZONE", chrono_tz::UTC),
            charset: std::env::var("PRINTER_CHARSET")
                .ok()
                .and_then(|v| Charset::parse(&v))
                .unwrap_or_default(),
            symbol: SymbolConfig {
                model: std::env::var("QR_MODEL")
                    .ok()
                    .and_then(|v| SymbolModel::parse(&v))
                    .unwrap_or(SymbolModel::Model2),
                module_size: env_or("QR_MODULE_SIZE", 6u8).clamp(1, 16),
                error_correction: std::env::var("QR_ECC")
                    .ok()
                    .and_then(|v| ErrorCorrection::parse(&v))
                    .unwrap_or(ErrorCorrection::M),
            },
            business_name: std::env::var("BUSINESS_NAME").unwrap_or_else(|_| "Study Nook".into()),
            closing_message: std::env::var("CLOSING_MESSAGE")
                .unwrap_or_else(|_| "Thank you!".into()),

            printer_name: non_empty_var("PRINTER_NAME"),
            device_dir: std::env::var("DEVICE_DIR").unwrap_or_else(|_| "/dev".into()),

            worker_poll_ms: env_or("WORKER_POLL_MS", 2000),
            retry_scan_secs: env_or("RETRY_SCAN_SECS", 60),
            max_auto_retries: env_or("MAX_AUTO_RETRIES", 3),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 3600),
            retention_days: env_or("RETENTION_DAYS", 7),
            transmit_attempts: env_or("TRANSMIT_ATTEMPTS", 3),
            transmit_backoff_ms: env_or("TRANSMIT_BACKOFF_MS", 2000),
        }
    }

    /// 使用自定义工作目录覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// Queue database file
    pub fn queue_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("print_jobs.redb")
    }

    /// Where undeliverable receipts are saved
    pub fn fallback_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("fallback")
    }

    pub fn encoder(&self) -> ReceiptEncoder {
        ReceiptEncoder::new(self.paper_width, self.display_timezone)
            .with_charset(self.charset)
            .with_symbol(self.symbol)
            .with_business_name(self.business_name.clone())
            .with_closing_message(self.closing_message.clone())
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            device_dir: PathBuf::from(&self.device_dir),
            printer_name: self.printer_name.clone(),
            ..DiscoveryConfig::default()
        }
    }

    pub fn transmit_policy(&self) -> TransmitPolicy {
        TransmitPolicy {
            attempts: self.transmit_attempts.max(1),
            retry_backoff: Duration::from_millis(self.transmit_backoff_ms),
            ..TransmitPolicy::default()
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(self.worker_poll_ms),
            retry_scan_interval: Duration::from_secs(self.retry_scan_secs),
            max_auto_retries: self.max_auto_retries,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            retention: Duration::from_secs(self.retention_days.saturating_mul(24 * 3600)),
        }
        .clamped()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
