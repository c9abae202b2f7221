
use nook_printer::{Discovery, FallbackStore, ReliableTransmitter};

use crate::core::{BackgroundTasks, Config};
use crate::printing::{PrintJobQueue, PrintServiceResult, ReceiptPrintService};

/// 服务状态 - 持有打印服务的共享引用
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | print_service | 队列, 渲染, 发现, 发送 |
#[derive(Clone, Debug)]
pub struct SpoolerState {
    pub config: Config,
    pub print_service: ReceiptPrintService,
}

impl SpoolerState {
    /// Open the queue under the work dir and wire the print pipeline
    pub fn initialize(config: &Config) -> PrintServiceResult<Self> {
        std::fs::create_dir_all(&config.work_dir).map_err(|e| {
            crate::printing::PrintServiceError::QueueUnavailable(format!(
                "Cannot create work dir {}: {}",
                config.work_dir, e
            ))
        })?;

        let queue = PrintJobQueue::open(config.queue_path())?;
        let discovery = Discovery::standard(&config.discovery());
        let transmitter = ReliableTransmitter::new(
            config.transmit_policy(),
            FallbackStore::new(config.fallback_dir()),
        );

        tracing::info!(
            queue = %config.queue_path().display(),
            fallback = %config.fallback_dir().display(),
            "Print pipeline ready"
        );

        Ok(Self {
            config: config.clone(),
            print_service: ReceiptPrintService::new(
                queue,
                config.encoder(),
                discovery,
                transmitter,
            ),
        })
    }

    /// Spawn the queue worker as a supervised task
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let worker = self.print_service.worker(self.config.worker_settings());
        tasks.spawn("print_queue_worker", worker.run(tasks.shutdown_token()));
    }
}
