//! Receipt output device
//!
//! Renders a job with the configured profile and hands the bytes to the
//! configured transport.

use std::sync::Arc;

use async_trait::async_trait;
use receipt_printer::{
    AnyPrinter, DryRunPrinter, FilePrinter, NetworkPrinter, PrintError, PrintResult, Printer,
    UsbPrinter, dialect_by_name,
};
use tracing::{info, instrument};

use super::renderer::ReceiptRenderer;
use super::types::PrinterJob;
use crate::core::{PrinterConfig, PrinterTransport};

/// Something that turns a job into paper
#[async_trait]
pub trait ReceiptDevice: Send + Sync {
    async fn render(&self, job: &PrinterJob) -> PrintResult<()>;

    async fn is_online(&self) -> bool;
}

/// ESC/POS device: profile renderer plus transport
#[derive(Debug)]
pub struct EscPosDevice {
    renderer: ReceiptRenderer,
    printer: AnyPrinter,
}

impl EscPosDevice {
    pub fn new(renderer: ReceiptRenderer, printer: AnyPrinter) -> Self {
        Self { renderer, printer }
    }

    pub fn from_config(config: &PrinterConfig) -> PrintResult<Self> {
        let dialect = dialect_by_name(&config.profile)?;
        let printer = build_printer(config)?;
        info!(
            profile = dialect.name(),
            transport = printer.kind(),
            columns = dialect.columns(),
            "Receipt device ready"
        );
        Ok(Self::new(ReceiptRenderer::new(Arc::from(dialect)), printer))
    }
}

#[async_trait]
impl ReceiptDevice for EscPosDevice {
    #[instrument(skip(self, job), fields(identifier = %job.identifier))]
    async fn render(&self, job: &PrinterJob) -> PrintResult<()> {
        // Image scaling and dithering are CPU bound
        let renderer = self.renderer.clone();
        let owned = job.clone();
        let data = tokio::task::spawn_blocking(move || renderer.render(&owned))
            .await
            .map_err(|e| PrintError::Unrecoverable(format!("render task failed: {e}")))?;

        self.printer.print(&data).await?;
        info!(bytes = data.len(), transport = self.printer.kind(), "Receipt printed");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        self.printer.is_online().await
    }
}

/// Open the transport named in the config
pub fn build_printer(config: &PrinterConfig) -> PrintResult<AnyPrinter> {
    let printer = match config.transport {
        PrinterTransport::Usb => AnyPrinter::Usb(UsbPrinter::new(config.usb())),
        PrinterTransport::File => AnyPrinter::File(FilePrinter::new(&config.device_path)?),
        PrinterTransport::Network => AnyPrinter::Network(
            NetworkPrinter::from_addr(&config.addr)?.with_timeout(config.render_timeout),
        ),
        PrinterTransport::DryRun => AnyPrinter::DryRun(DryRunPrinter::new()),
    };
    Ok(printer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SubmissionId;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(transport: PrinterTransport) -> PrinterConfig {
        PrinterConfig {
            transport,
            profile: "POS-5890".into(),
            vendor_id: 0x6868,
            product_id: 0x0200,
            in_ep: 0x81,
            out_ep: 0x03,
            device_path: PathBuf::from("/dev/usb/lp0"),
            addr: "127.0.0.1:9100".into(),
            render_timeout: Duration::from_secs(2),
            dry_run: false,
        }
    }

    fn job() -> PrinterJob {
        PrinterJob {
            identifier: SubmissionId::from_raw(77),
            title: None,
            text: "Hello, world!".into(),
            image: None,
        }
    }

    #[test]
    fn test_build_printer_kinds() {
        assert_eq!(build_printer(&config(PrinterTransport::Usb)).unwrap().kind(), "usb");
        assert_eq!(
            build_printer(&config(PrinterTransport::Network)).unwrap().kind(),
            "network"
        );
        assert_eq!(
            build_printer(&config(PrinterTransport::DryRun)).unwrap().kind(),
            "dry-run"
        );
    }

    #[test]
    fn test_unknown_profile_is_rejected() {
        let mut cfg = config(PrinterTransport::DryRun);
        cfg.profile = "XP-80".into();
        assert!(matches!(
            EscPosDevice::from_config(&cfg),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_network_address_is_rejected() {
        let mut cfg = config(PrinterTransport::Network);
        cfg.addr = "not-an-address".into();
        assert!(build_printer(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_file_device_receives_rendered_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lp0");
        std::fs::write(&path, b"").unwrap();
        let mut cfg = config(PrinterTransport::File);
        cfg.device_path = path.clone();

        let device = EscPosDevice::from_config(&cfg).unwrap();
        device.render(&job()).await.unwrap();

        let written = std::fs::read(&path).unwrap();
        let footer = format!("#{}", SubmissionId::from_raw(77));
        assert!(written.windows(footer.len()).any(|w| w == footer.as_bytes()));
    }

    #[tokio::test]
    async fn test_dry_run_device_is_online() {
        let device = EscPosDevice::from_config(&config(PrinterTransport::DryRun)).unwrap();
        assert!(device.is_online().await);
        device.render(&job()).await.unwrap();
    }
}
