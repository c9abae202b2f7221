//! 核心模块 - 配置、状态和后台任务
//!
//! - [`Config`] - 环境变量配置
//! - [`SpoolerState`] - 打印服务状态
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::SpoolerState;
pub use tasks::BackgroundTasks;
