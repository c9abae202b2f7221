//! Serial device writer (USB-serial and Bluetooth SPP)
//!
//! Thermal heads and low-throughput radio links cannot absorb a whole
//! receipt at once. Data goes out in fixed-size chunks with a pause between
//! chunks and a settle delay after the last one, before the node is closed.
//!
//! The node is switched to raw TTY mode first so binary data (including
//! 0x11/0x13, which XON/XOFF would swallow) passes through unmodified.

use std::path::Path;
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{TransmitError, TransmitResult};

/// Chunking and pacing for one serial link class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialPacing {
    /// Bytes per write
    pub chunk_size: usize,
    /// Pause between chunks
    pub chunk_delay: Duration,
    /// Pause after the final chunk before closing
    pub settle_delay: Duration,
}

impl SerialPacing {
    /// Wired USB adapters: large chunks, short pauses
    pub fn usb() -> Self {
        Self {
            chunk_size: 512,
            chunk_delay: Duration::from_millis(20),
            settle_delay: Duration::from_millis(200),
        }
    }

    /// Bluetooth SPP: small chunks, long pauses, multi-second settle
    pub fn bluetooth() -> Self {
        Self {
            chunk_size: 128,
            chunk_delay: Duration::from_millis(300),
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Open a device node and write `data` with pacing.
///
/// Open and every chunk write are individually bounded. Any failure aborts
/// the whole write; there is no resume from an offset.
#[instrument(
    skip(path, data, pacing),
    fields(path = %path.display(), data_len = data.len(), chunk = pacing.chunk_size)
)]
pub async fn write_paced(
    path: &Path,
    data: &[u8],
    pacing: &SerialPacing,
    open_timeout: Duration,
    write_timeout: Duration,
) -> TransmitResult<()> {
    let label = path.display().to_string();

    let mut file = tokio::time::timeout(open_timeout, OpenOptions::new().write(true).open(path))
        .await
        .map_err(|_| TransmitError::Timeout(format!("Open timeout: {}", label)))?
        .map_err(|e| TransmitError::from_open(&label, e))?;

    configure_raw(&file, &label);

    let chunk_size = pacing.chunk_size.max(1);
    let total_chunks = data.len().div_ceil(chunk_size);
    let mut written = 0usize;

    for (i, chunk) in data.chunks(chunk_size).enumerate() {
        let result = tokio::time::timeout(write_timeout, async {
            file.write_all(chunk).await?;
            file.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => written += chunk.len(),
            Ok(Err(e)) => return Err(TransmitError::from_write(&label, written, e)),
            Err(_) => {
                return Err(TransmitError::Timeout(format!(
                    "Write timeout on {} after {} bytes",
                    label, written
                )));
            }
        }

        if i + 1 < total_chunks && !pacing.chunk_delay.is_zero() {
            tokio::time::sleep(pacing.chunk_delay).await;
        }
    }

    if written != data.len() {
        return Err(TransmitError::PartialWrite(format!(
            "{}: {} of {} bytes written",
            label,
            written,
            data.len()
        )));
    }

    if !pacing.settle_delay.is_zero() {
        tokio::time::sleep(pacing.settle_delay).await;
    }

    debug!(bytes = written, chunks = total_chunks, "Serial write complete");
    Ok(())
}

/// Put the node into raw mode when it is a TTY.
///
/// Regular files and pipes are left alone.
#[cfg(unix)]
fn configure_raw(file: &tokio::fs::File, label: &str) {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    if unsafe { libc::isatty(fd) } != 1 {
        debug!(path = label, "Not a TTY, skipping raw mode");
        return;
    }

    let mut termios = std::mem::MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        debug!(path = label, error = %std::io::Error::last_os_error(), "tcgetattr failed");
        return;
    }
    let mut termios = unsafe { termios.assume_init() };

    // No input processing and no XON/XOFF flow control
    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    // 8N1
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        debug!(path = label, error = %std::io::Error::last_os_error(), "tcsetattr failed");
    }
}

#[cfg(not(unix))]
fn configure_raw(_file: &tokio::fs::File, _label: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_pacing(chunk_size: usize) -> SerialPacing {
        SerialPacing {
            chunk_size,
            chunk_delay: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_bluetooth_pacing_is_slower_than_usb() {
        let usb = SerialPacing::usb();
        let bt = SerialPacing::bluetooth();
        assert_eq!(usb.chunk_size, 512);
        assert!(bt.chunk_size < usb.chunk_size);
        assert!(bt.chunk_delay > usb.chunk_delay);
        assert!(bt.settle_delay >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_write_paced_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttyUSB0");
        std::fs::write(&path, b"").unwrap();

        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        write_paced(
            &path,
            &data,
            &fast_pacing(64),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn test_missing_device_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_paced(
            &dir.path().join("rfcomm9"),
            b"hello",
            &fast_pacing(2),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransmitError::ChannelUnavailable(_)));
    }

    #[cfg(unix)]
    fn make_fifo(path: &Path) {
        use std::os::unix::ffi::OsStrExt;
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);
    }

    #[cfg(unix)]
    fn open_reader(path: &Path) -> std::fs::File {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .unwrap()
    }

    /// A FIFO without a reader blocks in open(2), like an unpaired SPP node
    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("rfcomm0");
        make_fifo(&fifo);

        let err = write_paced(
            &fifo,
            b"hello",
            &fast_pacing(2),
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        match err {
            TransmitError::Timeout(msg) => assert!(msg.contains("Open timeout")),
            other => panic!("expected Timeout, got {:?}", other),
        }

        // Release the blocked open so the runtime can shut down
        let reader = open_reader(&fifo);
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(reader);
    }

    /// A reader that never reads fills the pipe and stalls the write
    #[cfg(unix)]
    #[tokio::test]
    async fn test_chunk_write_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("ttyUSB0");
        make_fifo(&fifo);
        let reader = open_reader(&fifo);

        let data = vec![0x1b; 512 * 1024];
        let err = write_paced(
            &fifo,
            &data,
            &fast_pacing(data.len()),
            Duration::from_secs(1),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        match err {
            TransmitError::Timeout(msg) => assert!(msg.contains("Write timeout")),
            other => panic!("expected Timeout, got {:?}", other),
        }

        // Closing the reader fails the stalled write with EPIPE
        drop(reader);
    }
}
