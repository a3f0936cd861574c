//! Printer transports for sending ESC/POS data
//!
//! Supports:
//! - USB printers through libusb bulk transfers (feature `usb`)
//! - Kernel character devices (`/dev/usb/lp0`)
//! - Network printers (TCP port 9100)
//! - Dry run (log only)

use crate::error::{PrintError, PrintResult};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

#[cfg(feature = "usb")]
use crate::usb::UsbPrinter;

/// Trait for printer transports
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Network printer (TCP port 9100)
///
/// Most thermal printers support raw TCP printing on port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create from a socket address string (e.g., "192.168.1.100:9100")
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;

        Ok(Self {
            addr,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::NotConnected(format!("{}: {}", self.addr, e)))?;

        info!("Connected, sending {} bytes", data.len());

        stream.write_all(data).await?;
        stream.flush().await?;

        info!("Print job sent");
        Ok(())
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

/// Printer exposed by the kernel as a character device (usblp, rfcomm)
#[derive(Debug, Clone)]
pub struct FilePrinter {
    path: PathBuf,
}

impl FilePrinter {
    pub fn new(path: impl AsRef<Path>) -> PrintResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(PrintError::InvalidConfig("Empty device path".to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Printer for FilePrinter {
    #[instrument(skip(data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        // Never create the node: a missing device means the printer is unplugged
        let mut device = tokio::fs::OpenOptions::new()
            .write(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PrintError::NotConnected(format!("{}: {}", self.path.display(), e)))?;

        device.write_all(data).await?;
        device.flush().await?;

        info!("Print job written to device");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }
}

/// Transport that only logs what it would send
#[derive(Debug, Default)]
pub struct DryRunPrinter {
    jobs: AtomicUsize,
}

impl DryRunPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs accepted so far
    pub fn jobs(&self) -> usize {
        self.jobs.load(Ordering::Relaxed)
    }
}

impl Printer for DryRunPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let job = self.jobs.fetch_add(1, Ordering::Relaxed) + 1;
        info!(job, data_len = data.len(), "Dry run: print job discarded");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        true
    }
}

/// Any configured transport
#[derive(Debug)]
pub enum AnyPrinter {
    #[cfg(feature = "usb")]
    Usb(UsbPrinter),
    File(FilePrinter),
    Network(NetworkPrinter),
    DryRun(DryRunPrinter),
}

impl AnyPrinter {
    pub fn kind(&self) -> &'static str {
        match self {
            #[cfg(feature = "usb")]
            AnyPrinter::Usb(_) => "usb",
            AnyPrinter::File(_) => "file",
            AnyPrinter::Network(_) => "network",
            AnyPrinter::DryRun(_) => "dry-run",
        }
    }
}

impl Printer for AnyPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        match self {
            #[cfg(feature = "usb")]
            AnyPrinter::Usb(p) => p.print(data).await,
            AnyPrinter::File(p) => p.print(data).await,
            AnyPrinter::Network(p) => p.print(data).await,
            AnyPrinter::DryRun(p) => p.print(data).await,
        }
    }

    async fn is_online(&self) -> bool {
        match self {
            #[cfg(feature = "usb")]
            AnyPrinter::Usb(p) => p.is_online().await,
            AnyPrinter::File(p) => p.is_online().await,
            AnyPrinter::Network(p) => p.is_online().await,
            AnyPrinter::DryRun(p) => p.is_online().await,
        }
    }
}
