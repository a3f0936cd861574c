use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use receipt_printer::{PROFILE_NAMES, UsbConfig, dialect_by_name};

use super::error::{Result, ServerError};

/// Which halves of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP intake + broker publisher
    Intake,
    /// Broker subscriber + print worker
    Worker,
    /// Both in one process
    All,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Intake => "intake",
            RunMode::Worker => "worker",
            RunMode::All => "all",
        }
    }

    pub fn runs_intake(&self) -> bool {
        matches!(self, RunMode::Intake | RunMode::All)
    }

    pub fn runs_worker(&self) -> bool {
        matches!(self, RunMode::Worker | RunMode::All)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intake" => Ok(RunMode::Intake),
            "worker" => Ok(RunMode::Worker),
            "all" => Ok(RunMode::All),
            other => Err(ServerError::Config(format!(
                "RUN_MODE must be intake, worker or all (got '{other}')"
            ))),
        }
    }
}

/// Device transport used by the print worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterTransport {
    Usb,
    File,
    Network,
    DryRun,
}

impl FromStr for PrinterTransport {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usb" => Ok(PrinterTransport::Usb),
            "file" => Ok(PrinterTransport::File),
            "network" | "tcp" => Ok(PrinterTransport::Network),
            "dry-run" | "dry_run" | "none" => Ok(PrinterTransport::DryRun),
            other => Err(ServerError::Config(format!(
                "PRINTER_TRANSPORT must be usb, file, network or dry-run (got '{other}')"
            ))),
        }
    }
}

/// Broker implementation carrying the submission topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    Mqtt,
    /// In-process queue, only meaningful when one process runs both halves
    Memory,
}

impl FromStr for BrokerKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Ok(BrokerKind::Mqtt),
            "memory" => Ok(BrokerKind::Memory),
            other => Err(ServerError::Config(format!(
                "BROKER must be mqtt or memory (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub max_packet_bytes: usize,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub transport: PrinterTransport,
    pub profile: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub in_ep: u8,
    pub out_ep: u8,
    pub device_path: PathBuf,
    pub addr: String,
    pub render_timeout: Duration,
    /// Persist submissions but never touch the device
    pub dry_run: bool,
}

impl PrinterConfig {
    pub fn usb(&self) -> UsbConfig {
        UsbConfig {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            in_ep: self.in_ep,
            out_ep: self.out_ep,
            ..UsbConfig::default()
        }
    }
}

/// Bounds enforced on incoming submissions
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_text_chars: usize,
    pub max_title_chars: usize,
    pub max_image_bytes: usize,
    pub max_image_width: u32,
    pub max_image_height: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 1000,
            max_title_chars: 100,
            max_image_bytes: 2 * 1024 * 1024,
            max_image_width: 4096,
            max_image_height: 4096,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub dir: Option<String>,
}

/// Print server configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | RUN_MODE | all | intake, worker or all |
/// | HTTP_PORT | 8000 | HTTP listen port |
/// | PUBLIC_DIR | public | Static web client |
/// | DATABASE_PATH | printer_messages.db | SQLite file |
/// | BROKER | mqtt | mqtt or memory |
/// | MQTT_HOST / MQTT_PORT | 127.0.0.1 / 1883 | Broker address |
/// | MQTT_TOPIC | printer | Submission topic |
/// | MQTT_CLIENT_ID | print-server-{mode} | Broker session id |
/// | MQTT_KEEP_ALIVE_SECS | 30 | Keep-alive interval |
/// | MQTT_MAX_PACKET_BYTES | 4194304 | Largest envelope accepted |
/// | PUBLISH_TIMEOUT_MS | 5000 | Intake publish timeout |
/// | MAX_TEXT_CHARS / MAX_TITLE_CHARS | 1000 / 100 | Text bounds |
/// | MAX_IMAGE_BYTES | 2097152 | Image size bound |
/// | MAX_IMAGE_WIDTH / MAX_IMAGE_HEIGHT | 4096 / 4096 | Image pixel bounds |
/// | PRINTER_TRANSPORT | usb | usb, file, network or dry-run |
/// | PRINTER_PROFILE | NT-5890K | POS-5890, NT-5890K or TM-T88 |
/// | PRINTER_VENDOR_ID / PRINTER_PRODUCT_ID | 0x6868 / 0x0200 | USB ids |
/// | PRINTER_IN_EP / PRINTER_OUT_EP | 0x81 / 0x03 | USB endpoints |
/// | PRINTER_DEVICE_PATH | /dev/usb/lp0 | Device file |
/// | PRINTER_ADDR | 127.0.0.1:9100 | Network printer |
/// | RENDER_TIMEOUT_MS | 10000 | Device render timeout |
/// | DRY_RUN | false | Skip rendering |
/// | LOG_LEVEL / LOG_JSON / LOG_DIR | info / false / - | Logging |
///
/// # Example
///
/// ```ignore
/// RUN_MODE=worker PRINTER_TRANSPORT=network PRINTER_ADDR=192.168.1.50:9100 print-server
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub run_mode: RunMode,
    pub http_port: u16,
    pub public_dir: PathBuf,
    pub database_path: String,
    pub broker: BrokerConfig,
    pub printer: PrinterConfig,
    pub limits: LimitsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unset keys fall back to defaults; malformed numbers are reported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let run_mode: RunMode = env.string("RUN_MODE", "all").parse()?;
        let defaults = LimitsConfig::default();

        let config = Self {
            run_mode,
            http_port: env.parse("HTTP_PORT", 8000)?,
            public_dir: PathBuf::from(env.string("PUBLIC_DIR", "public")),
            database_path: env.string("DATABASE_PATH", "printer_messages.db"),
            broker: BrokerConfig {
                kind: env.string("BROKER", "mqtt").parse()?,
                host: env.string("MQTT_HOST", "127.0.0.1"),
                port: env.parse("MQTT_PORT", 1883)?,
                topic: env.string("MQTT_TOPIC", "printer"),
                client_id: env.string("MQTT_CLIENT_ID", &format!("print-server-{run_mode}")),
                keep_alive: Duration::from_secs(env.parse("MQTT_KEEP_ALIVE_SECS", 30)?),
                max_packet_bytes: env.parse("MQTT_MAX_PACKET_BYTES", 4 * 1024 * 1024)?,
                publish_timeout: Duration::from_millis(env.parse("PUBLISH_TIMEOUT_MS", 5000)?),
            },
            printer: PrinterConfig {
                transport: env.string("PRINTER_TRANSPORT", "usb").parse()?,
                profile: env.string("PRINTER_PROFILE", "NT-5890K"),
                vendor_id: env.hex("PRINTER_VENDOR_ID", 0x6868)?,
                product_id: env.hex("PRINTER_PRODUCT_ID", 0x0200)?,
                in_ep: env.hex_u8("PRINTER_IN_EP", 0x81)?,
                out_ep: env.hex_u8("PRINTER_OUT_EP", 0x03)?,
                device_path: PathBuf::from(env.string("PRINTER_DEVICE_PATH", "/dev/usb/lp0")),
                addr: env.string("PRINTER_ADDR", "127.0.0.1:9100"),
                render_timeout: Duration::from_millis(env.parse("RENDER_TIMEOUT_MS", 10_000)?),
                dry_run: env.flag("DRY_RUN", false)?,
            },
            limits: LimitsConfig {
                max_text_chars: env.parse("MAX_TEXT_CHARS", defaults.max_text_chars)?,
                max_title_chars: env.parse("MAX_TITLE_CHARS", defaults.max_title_chars)?,
                max_image_bytes: env.parse("MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
                max_image_width: env.parse("MAX_IMAGE_WIDTH", defaults.max_image_width)?,
                max_image_height: env.parse("MAX_IMAGE_HEIGHT", defaults.max_image_height)?,
            },
            log: LogConfig {
                level: env.string("LOG_LEVEL", "info"),
                json: env.flag("LOG_JSON", false)?,
                dir: env.get("LOG_DIR"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the process cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.run_mode.runs_worker() {
            dialect_by_name(&self.printer.profile).map_err(|_| {
                ServerError::Config(format!(
                    "PRINTER_PROFILE '{}' is unknown, expected one of {}",
                    self.printer.profile,
                    PROFILE_NAMES.join(", ")
                ))
            })?;
        }
        if self.broker.kind == BrokerKind::Memory && self.run_mode != RunMode::All {
            return Err(ServerError::Config(
                "BROKER=memory requires RUN_MODE=all".into(),
            ));
        }
        if self.broker.topic.is_empty() || self.broker.topic.contains(['+', '#']) {
            return Err(ServerError::Config(format!(
                "MQTT_TOPIC '{}' must be a non-empty topic without wildcards",
                self.broker.topic
            )));
        }
        if self.limits.max_text_chars == 0 {
            return Err(ServerError::Config("MAX_TEXT_CHARS must be positive".into()));
        }
        // The envelope carries the image base64 encoded
        let largest_envelope = self.limits.max_image_bytes.div_ceil(3) * 4 + 64 * 1024;
        if largest_envelope > self.broker.max_packet_bytes {
            return Err(ServerError::Config(format!(
                "MQTT_MAX_PACKET_BYTES ({}) cannot carry a {} byte image",
                self.broker.max_packet_bytes, self.limits.max_image_bytes
            )));
        }
        Ok(())
    }

    /// Largest HTTP request body the intake accepts
    pub fn body_limit(&self) -> usize {
        // base64 JSON or multipart framing around the largest image
        self.limits.max_image_bytes.div_ceil(3) * 4 + 64 * 1024
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("{key} has an invalid value '{v}'"))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ServerError::Config(format!("{key} must be a boolean (got '{v}')"))),
            },
            None => Ok(default),
        }
    }

    fn hex(&self, key: &str, default: u16) -> Result<u16> {
        match self.get(key) {
            Some(v) => parse_hex_u16(&v)
                .ok_or_else(|| ServerError::Config(format!("{key} has an invalid value '{v}'"))),
            None => Ok(default),
        }
    }

    fn hex_u8(&self, key: &str, default: u8) -> Result<u8> {
        let value = self.hex(key, default as u16)?;
        u8::try_from(value)
            .map_err(|_| ServerError::Config(format!("{key} must fit in one byte (got {value:#x})")))
    }
}

/// Parse `0x6868`, `6868h` style hex or plain decimal
fn parse_hex_u16(value: &str) -> Option<u16> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        return u16::from_str_radix(hex, 16).ok();
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.run_mode, RunMode::All);
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.database_path, "printer_messages.db");
        assert_eq!(config.broker.topic, "printer");
        assert_eq!(config.broker.kind, BrokerKind::Mqtt);
        assert_eq!(config.broker.client_id, "print-server-all");
        assert_eq!(config.printer.transport, PrinterTransport::Usb);
        assert_eq!(config.printer.vendor_id, 0x6868);
        assert_eq!(config.printer.product_id, 0x0200);
        assert_eq!((config.printer.in_ep, config.printer.out_ep), (0x81, 0x03));
        assert_eq!(config.limits.max_image_bytes, 2 * 1024 * 1024);
        assert!(!config.printer.dry_run);
        assert!(config.log.dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RUN_MODE", "Worker"),
            ("PRINTER_TRANSPORT", "network"),
            ("PRINTER_PROFILE", "tm-t88"),
            ("PRINTER_VENDOR_ID", "0x04b8"),
            ("PRINTER_PRODUCT_ID", "3605"),
            ("DRY_RUN", "yes"),
            ("LOG_DIR", "/var/log/print-server"),
        ])
        .unwrap();
        assert_eq!(config.run_mode, RunMode::Worker);
        assert!(!config.run_mode.runs_intake());
        assert_eq!(config.broker.client_id, "print-server-worker");
        assert_eq!(config.printer.transport, PrinterTransport::Network);
        assert_eq!(config.printer.vendor_id, 0x04b8);
        assert_eq!(config.printer.product_id, 3605);
        assert!(config.printer.dry_run);
        assert_eq!(config.log.dir.as_deref(), Some("/var/log/print-server"));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(matches!(config_from(&[("RUN_MODE", "both")]), Err(ServerError::Config(_))));
        assert!(matches!(config_from(&[("HTTP_PORT", "eighty")]), Err(ServerError::Config(_))));
        assert!(matches!(
            config_from(&[("PRINTER_TRANSPORT", "serial")]),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("PRINTER_PROFILE", "LX-300")]),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(config_from(&[("PRINTER_OUT_EP", "0x1ff")]), Err(ServerError::Config(_))));
        assert!(matches!(config_from(&[("MQTT_TOPIC", "printer/#")]), Err(ServerError::Config(_))));
        assert!(matches!(
            config_from(&[("BROKER", "memory"), ("RUN_MODE", "worker")]),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_profile_is_fine_for_intake_only() {
        let config = config_from(&[("RUN_MODE", "intake"), ("PRINTER_PROFILE", "LX-300")]).unwrap();
        assert_eq!(config.run_mode, RunMode::Intake);
    }

    #[test]
    fn test_packet_size_must_fit_largest_image() {
        let err = config_from(&[("MQTT_MAX_PACKET_BYTES", "1024")]).unwrap_err();
        assert!(err.to_string().contains("MQTT_MAX_PACKET_BYTES"));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u16("0x6868"), Some(0x6868));
        assert_eq!(parse_hex_u16("0X0200"), Some(0x0200));
        assert_eq!(parse_hex_u16("129"), Some(129));
        assert_eq!(parse_hex_u16("0xZZ"), None);
    }
}
