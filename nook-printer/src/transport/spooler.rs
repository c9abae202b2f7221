//! OS print spooler adapter
//!
//! Jobs are submitted raw so the driver never re-renders the ESC/POS stream.
//! Success means the spooler accepted the job; its own queueing and retry
//! take over from there.
//!
//! - Unix: CUPS command line (`lpstat -a`, `lp -o raw`)
//! - Windows: Win32 spooler API with the `RAW` datatype

use std::time::Duration;

use tracing::{info, instrument};

use crate::error::{TransmitError, TransmitResult};

/// Parse `lpstat -a` output into the queues currently accepting jobs
///
/// Lines look like `XP-58 accepting requests since Tue 14 Oct 2026 09:12:03`.
pub fn parse_lpstat(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(" accepting") && !line.contains("not accepting"))
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.to_string())
        .collect()
}

/// Names of the spool queues visible right now
#[cfg(unix)]
pub async fn list_queues() -> std::io::Result<Vec<String>> {
    let output = tokio::process::Command::new("lpstat")
        .arg("-a")
        .kill_on_drop(true)
        .output()
        .await?;

    // lpstat exits non-zero when no destinations exist
    if !output.status.success() {
        return Ok(Vec::new());
    }
    Ok(parse_lpstat(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
pub async fn list_queues() -> std::io::Result<Vec<String>> {
    tokio::task::spawn_blocking(win::list)
        .await
        .map_err(std::io::Error::other)?
}

/// Hand `data` to the spooler as one raw job
#[cfg(unix)]
#[instrument(skip(data), fields(data_len = data.len()))]
pub async fn submit_raw(queue: &str, data: &[u8], timeout: Duration) -> TransmitResult<()> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;

    let mut child = tokio::process::Command::new("lp")
        .args(["-d", queue, "-o", "raw"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransmitError::ChannelUnavailable(format!("lp: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| TransmitError::ChannelUnavailable("lp: stdin not captured".to_string()))?;

    let run = async move {
        stdin.write_all(data).await?;
        drop(stdin);
        child.wait_with_output().await
    };

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| TransmitError::Timeout(format!("Spool submission to {}", queue)))?
        .map_err(|e| TransmitError::DeviceRejected(format!("lp: {}", e)))?;

    if !output.status.success() {
        return Err(TransmitError::DeviceRejected(format!(
            "{}: {}",
            queue,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    info!(
        queue,
        response = %String::from_utf8_lossy(&output.stdout).trim(),
        "Spooler accepted job"
    );
    Ok(())
}

#[cfg(windows)]
#[instrument(skip(data), fields(data_len = data.len()))]
pub async fn submit_raw(queue: &str, data: &[u8], timeout: Duration) -> TransmitResult<()> {
    let name = queue.to_string();
    let data = data.to_vec();

    let task = tokio::task::spawn_blocking(move || win::write_raw(&name, &data));
    tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| TransmitError::Timeout(format!("Spool submission to {}", queue)))?
        .map_err(|e| TransmitError::DeviceRejected(format!("Task join failed: {}", e)))??;

    info!(queue, "Spooler accepted job");
    Ok(())
}

#[cfg(windows)]
mod win {
    use crate::error::TransmitError;

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Port names of printers that never produce paper
    fn is_virtual_port(port: &str) -> bool {
        let p = port.to_lowercase();
        p == "file:"
            || p == "portprompt:"
            || p == "xpsport:"
            || p == "nul:"
            || p.starts_with("onenote")
            || p.starts_with("wfsport:")
    }

    /// Local and connected printers, virtual ones excluded
    pub(super) fn list() -> std::io::Result<Vec<String>> {
        use windows::Win32::Graphics::Printing::{
            EnumPrintersW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_5W,
        };
        use windows::core::PWSTR;

        unsafe {
            let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;

            let _ = EnumPrintersW(flags, None, 5, None, &mut needed, &mut returned);
            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                None,
                5,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|e| std::io::Error::other(format!("EnumPrintersW: {}", e)))?;

            let infos = std::slice::from_raw_parts(
                buf.as_ptr() as *const PRINTER_INFO_5W,
                returned as usize,
            );

            let mut names = Vec::new();
            for info in infos {
                if info.pPrinterName.is_null() {
                    continue;
                }
                let name = PWSTR(info.pPrinterName.0).to_string().unwrap_or_default();
                let port = if info.pPortName.is_null() {
                    String::new()
                } else {
                    PWSTR(info.pPortName.0).to_string().unwrap_or_default()
                };
                if !is_virtual_port(&port) {
                    names.push(name);
                }
            }
            Ok(names)
        }
    }

    /// One RAW document containing `data`
    pub(super) fn write_raw(name: &str, data: &[u8]) -> Result<(), TransmitError> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, OpenPrinterW, PRINTER_HANDLE,
            StartDocPrinterW, StartPagePrinter, WritePrinter,
        };
        use windows::core::{PCWSTR, PWSTR};

        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            let name_w = to_wide(name);
            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None).map_err(|e| {
                TransmitError::ChannelUnavailable(format!("OpenPrinterW {}: {}", name, e))
            })?;

            let doc_name_w = to_wide("Receipt");
            let datatype_w = to_wide("RAW");
            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(TransmitError::DeviceRejected(format!(
                    "StartDocPrinter refused by {}",
                    name
                )));
            }
            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(TransmitError::DeviceRejected(format!(
                    "StartPagePrinter refused by {}",
                    name
                )));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(
                handle,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            );

            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);

            if !ok.as_bool() {
                return Err(TransmitError::DeviceRejected(format!(
                    "WritePrinter failed on {}",
                    name
                )));
            }
            if written != data.len() as u32 {
                return Err(TransmitError::PartialWrite(format!(
                    "{}: {} of {} bytes spooled",
                    name,
                    written,
                    data.len()
                )));
            }
            Ok(())
        }
    }
}
