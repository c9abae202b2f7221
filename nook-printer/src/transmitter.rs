//! Reliable transmission to a discovered channel
//!
//! Every attempt sends the whole stream; a failure anywhere restarts from
//! byte zero on the next attempt. After the last attempt the stream is saved
//! to the fallback store so nothing is lost when no printer answers.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::error::{DeliveryError, TransmitError, TransmitResult};
use crate::fallback::FallbackStore;
use crate::transport::{Discovery, SerialPacing, TransportChannel, serial, spooler};

/// Retry and timing knobs
#[derive(Debug, Clone)]
pub struct TransmitPolicy {
    /// Total attempts per transmission (first try included)
    pub attempts: u32,
    /// Fixed pause between attempts
    pub retry_backoff: Duration,
    /// Bound on opening a device node
    pub open_timeout: Duration,
    /// Bound on each chunk write
    pub write_timeout: Duration,
    /// Bound on a spooler submission
    pub spool_timeout: Duration,
    pub usb: SerialPacing,
    pub bluetooth: SerialPacing,
}

impl Default for TransmitPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_backoff: Duration::from_secs(2),
            open_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            spool_timeout: Duration::from_secs(15),
            usb: SerialPacing::usb(),
            bluetooth: SerialPacing::bluetooth(),
        }
    }
}

/// Sends byte streams to printers with bounded retries
pub struct ReliableTransmitter {
    policy: TransmitPolicy,
    fallback: FallbackStore,
}

impl ReliableTransmitter {
    pub fn new(policy: TransmitPolicy, fallback: FallbackStore) -> Self {
        Self { policy, fallback }
    }

    pub fn policy(&self) -> &TransmitPolicy {
        &self.policy
    }

    pub fn fallback(&self) -> &FallbackStore {
        &self.fallback
    }

    /// Send `data` to `channel`, retrying the whole stream on failure.
    ///
    /// When every attempt fails the data is written to the fallback store
    /// and the last error is returned.
    #[instrument(skip(self, data), fields(channel = %channel, data_len = data.len()))]
    pub async fn transmit(&self, channel: &TransportChannel, data: &[u8]) -> TransmitResult<()> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt(channel, data).await {
                Ok(()) => {
                    info!(attempt, "Print data delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Print attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts && !self.policy.retry_backoff.is_zero() {
                tokio::time::sleep(self.policy.retry_backoff).await;
            }
        }

        self.save_fallback(data).await;
        Err(last_error
            .unwrap_or_else(|| TransmitError::ChannelUnavailable(channel.to_string())))
    }

    /// Discover a channel and transmit to it.
    ///
    /// With no channel at all the data still goes to the fallback store.
    pub async fn deliver(
        &self,
        discovery: &Discovery,
        data: &[u8],
    ) -> Result<TransportChannel, DeliveryError> {
        let Some(channel) = discovery.discover().await else {
            self.save_fallback(data).await;
            return Err(DeliveryError::NoChannel);
        };
        self.transmit(&channel, data).await?;
        Ok(channel)
    }

    async fn attempt(&self, channel: &TransportChannel, data: &[u8]) -> TransmitResult<()> {
        match channel {
            TransportChannel::SpoolerQueue(name) => {
                spooler::submit_raw(name, data, self.policy.spool_timeout).await
            }
            TransportChannel::SerialDevice(path) => {
                serial::write_paced(
                    path,
                    data,
                    &self.policy.usb,
                    self.policy.open_timeout,
                    self.policy.write_timeout,
                )
                .await
            }
            TransportChannel::BluetoothSerialDevice(path) => {
                serial::write_paced(
                    path,
                    data,
                    &self.policy.bluetooth,
                    self.policy.open_timeout,
                    self.policy.write_timeout,
                )
                .await
            }
        }
    }

    async fn save_fallback(&self, data: &[u8]) {
        if let Err(e) = self.fallback.persist(data).await {
            error!(
                dir = %self.fallback.dir().display(),
                error = %e,
                "Failed to save undeliverable print data"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::UsbSerialProbe;

    fn fast_policy() -> TransmitPolicy {
        let pacing = SerialPacing {
            chunk_size: 16,
            chunk_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        };
        TransmitPolicy {
            attempts: 3,
            retry_backoff: Duration::from_millis(1),
            open_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            spool_timeout: Duration::from_secs(1),
            usb: pacing,
            bluetooth: pacing,
        }
    }

    #[tokio::test]
    async fn test_transmit_success_no_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("ttyUSB0");
        std::fs::write(&device, b"").unwrap();
        let fallback = FallbackStore::new(dir.path().join("fallback"));
        let tx = ReliableTransmitter::new(fast_policy(), fallback.clone());

        let data = b"\x1b@receipt body\x1dV\x00".to_vec();
        tx.transmit(&TransportChannel::SerialDevice(device.clone()), &data)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&device).unwrap(), data);
        assert!(fallback.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_write_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FallbackStore::new(dir.path().join("fallback"));
        let tx = ReliableTransmitter::new(fast_policy(), fallback.clone());

        let channel = TransportChannel::BluetoothSerialDevice(dir.path().join("rfcomm0"));
        let err = tx.transmit(&channel, b"lost receipt").await.unwrap_err();
        assert!(matches!(err, TransmitError::ChannelUnavailable(_)));

        let files = fallback.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"lost receipt");
    }

    #[tokio::test]
    async fn test_deliver_without_channel_writes_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FallbackStore::new(dir.path().join("fallback"));
        let tx = ReliableTransmitter::new(fast_policy(), fallback.clone());
        let discovery = Discovery::new(Vec::new(), Duration::from_millis(10));

        let err = tx.deliver(&discovery, b"nowhere").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NoChannel));
        assert_eq!(fallback.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deliver_uses_discovered_channel() {
        let dir = tempfile::tempdir().unwrap();
        let devices = dir.path().join("dev");
        std::fs::create_dir(&devices).unwrap();
        std::fs::write(devices.join("ttyACM0"), b"").unwrap();

        let tx = ReliableTransmitter::new(fast_policy(), FallbackStore::new(dir.path().join("fb")));
        let discovery = Discovery::new(
            vec![Box::new(UsbSerialProbe::new(devices.clone()))],
            Duration::from_secs(1),
        );

        let channel = tx.deliver(&discovery, b"hi").await.unwrap();
        assert_eq!(channel, TransportChannel::SerialDevice(devices.join("ttyACM0")));
        assert_eq!(std::fs::read(devices.join("ttyACM0")).unwrap(), b"hi");
    }
}
