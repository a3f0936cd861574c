//! USB printer transport (libusb bulk endpoints)
//!
//! The device is opened per job and released afterwards. Before data is
//! written, the roll paper sensor is queried with the real-time status
//! command `DLE EOT 4`; a paper-end answer aborts the job with
//! [`PrintError::OutOfPaper`].

use std::time::Duration;

use rusb::{DeviceHandle, GlobalContext};
use tracing::{debug, info, instrument, warn};

use crate::error::{PrintError, PrintResult};
use crate::printer::Printer;

/// DLE EOT 4 - transmit roll paper sensor status
const PAPER_STATUS_REQUEST: [u8; 3] = [0x10, 0x04, 0x04];
const PAPER_END_BITS: u8 = 0x60;
const PAPER_NEAR_END_BITS: u8 = 0x0C;

/// Bulk transfer chunk size
const WRITE_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub in_ep: u8,
    pub out_ep: u8,
    pub interface: u8,
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x6868,
            product_id: 0x0200,
            in_ep: 0x81,
            out_ep: 0x03,
            interface: 0,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperStatus {
    Present,
    NearEnd,
    End,
}

/// Decode the answer to `DLE EOT 4`
pub fn parse_paper_status(byte: u8) -> PaperStatus {
    if byte & PAPER_END_BITS == PAPER_END_BITS {
        PaperStatus::End
    } else if byte & PAPER_NEAR_END_BITS == PAPER_NEAR_END_BITS {
        PaperStatus::NearEnd
    } else {
        PaperStatus::Present
    }
}

fn map_usb_error(err: rusb::Error) -> PrintError {
    match err {
        rusb::Error::NoDevice | rusb::Error::NotFound | rusb::Error::Access | rusb::Error::Busy => {
            PrintError::NotConnected(err.to_string())
        }
        rusb::Error::Timeout => PrintError::Timeout(err.to_string()),
        _ => PrintError::Unrecoverable(err.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct UsbPrinter {
    config: UsbConfig,
}

impl UsbPrinter {
    pub fn new(config: UsbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UsbConfig {
        &self.config
    }

    fn open(config: &UsbConfig) -> PrintResult<DeviceHandle<GlobalContext>> {
        let handle = rusb::open_device_with_vid_pid(config.vendor_id, config.product_id)
            .ok_or_else(|| {
                PrintError::NotConnected(format!(
                    "USB device {:04x}:{:04x} not found",
                    config.vendor_id, config.product_id
                ))
            })?;

        // Unsupported on some platforms; claiming still works there
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!(error = %e, "auto detach of kernel driver unavailable");
        }
        handle
            .claim_interface(config.interface)
            .map_err(map_usb_error)?;
        Ok(handle)
    }

    fn query_paper(handle: &DeviceHandle<GlobalContext>, config: &UsbConfig) -> Option<PaperStatus> {
        if let Err(e) = handle.write_bulk(config.out_ep, &PAPER_STATUS_REQUEST, config.timeout) {
            warn!(error = %e, "status request failed");
            return None;
        }
        let mut buf = [0u8; 1];
        match handle.read_bulk(config.in_ep, &mut buf, Duration::from_millis(500)) {
            Ok(1) => Some(parse_paper_status(buf[0])),
            Ok(_) => None,
            Err(e) => {
                // Many cheap printers never answer real-time status
                debug!(error = %e, "no status answer");
                None
            }
        }
    }

    fn print_blocking(config: &UsbConfig, data: &[u8]) -> PrintResult<()> {
        let handle = Self::open(config)?;

        let result = (|| {
            match Self::query_paper(&handle, config) {
                Some(PaperStatus::End) => return Err(PrintError::OutOfPaper),
                Some(PaperStatus::NearEnd) => warn!("Paper roll near end"),
                _ => {}
            }

            for chunk in data.chunks(WRITE_CHUNK) {
                let mut written = 0;
                while written < chunk.len() {
                    let n = handle
                        .write_bulk(config.out_ep, &chunk[written..], config.timeout)
                        .map_err(map_usb_error)?;
                    if n == 0 {
                        return Err(PrintError::Unrecoverable("USB write stalled".to_string()));
                    }
                    written += n;
                }
            }
            Ok(())
        })();

        if let Err(e) = handle.release_interface(config.interface) {
            debug!(error = %e, "release interface failed");
        }
        result
    }
}

impl Printer for UsbPrinter {
    #[instrument(skip(self, data), fields(
        vid = self.config.vendor_id,
        pid = self.config.product_id,
        data_len = data.len()
    ))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let config = self.config;
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || Self::print_blocking(&config, &data))
            .await
            .map_err(|e| PrintError::Unrecoverable(format!("USB task failed: {}", e)))??;

        info!("Print job sent");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        let config = self.config;
        tokio::task::spawn_blocking(move || {
            rusb::open_device_with_vid_pid(config.vendor_id, config.product_id).is_some()
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paper_status() {
        assert_eq!(parse_paper_status(0x12), PaperStatus::Present);
        assert_eq!(parse_paper_status(0x12 | 0x0C), PaperStatus::NearEnd);
        assert_eq!(parse_paper_status(0x12 | 0x60), PaperStatus::End);
        assert_eq!(parse_paper_status(0x7E), PaperStatus::End);
    }

    #[test]
    fn test_usb_error_mapping() {
        assert!(matches!(map_usb_error(rusb::Error::NoDevice), PrintError::NotConnected(_)));
        assert!(matches!(map_usb_error(rusb::Error::Timeout), PrintError::Timeout(_)));
        assert!(matches!(map_usb_error(rusb::Error::Pipe), PrintError::Unrecoverable(_)));
    }

    #[test]
    fn test_default_config_matches_guestbook_printer() {
        let config = UsbConfig::default();
        assert_eq!((config.vendor_id, config.product_id), (0x6868, 0x0200));
        assert_eq!((config.in_ep, config.out_ep), (0x81, 0x03));
    }
}
