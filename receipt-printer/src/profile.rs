//! Printer profiles
//!
//! Each supported printer model is a [`Dialect`]: paper geometry, text code
//! page and the finishing sequence sent after a receipt.
//!
//! | name       | paper | columns | dots | text encoding | finish        |
//! |------------|-------|---------|------|---------------|---------------|
//! | `POS-5890` | 58mm  | 32      | 384  | CP1252        | feed          |
//! | `NT-5890K` | 58mm  | 32      | 384  | GBK           | feed + buzzer |
//! | `TM-T88`   | 80mm  | 48      | 512  | CP1252        | feed + cut    |

use std::fmt;

use crate::encoding::TextEncoding;
use crate::error::{PrintError, PrintResult};
use crate::escpos::EscPosBuilder;

/// Model-specific behaviour of an ESC/POS printer
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Configuration name of the profile
    fn name(&self) -> &'static str;

    /// Characters per line at normal size
    fn columns(&self) -> usize;

    /// Printable width in dots, used to scale raster images
    fn dot_width(&self) -> u32;

    fn encoding(&self) -> TextEncoding;

    /// Append the end-of-receipt sequence
    fn finish(&self, builder: &mut EscPosBuilder);
}

/// Generic 58mm printer on a Western code page
#[derive(Debug, Clone, Copy, Default)]
pub struct Pos5890;

impl Dialect for Pos5890 {
    fn name(&self) -> &'static str {
        "POS-5890"
    }

    fn columns(&self) -> usize {
        32
    }

    fn dot_width(&self) -> u32 {
        384
    }

    fn encoding(&self) -> TextEncoding {
        TextEncoding::Cp1252
    }

    fn finish(&self, builder: &mut EscPosBuilder) {
        builder.feed(4);
    }
}

/// 58mm printer in Chinese mode with a buzzer and no cutter
#[derive(Debug, Clone, Copy, Default)]
pub struct Nt5890k;

impl Dialect for Nt5890k {
    fn name(&self) -> &'static str {
        "NT-5890K"
    }

    fn columns(&self) -> usize {
        32
    }

    fn dot_width(&self) -> u32 {
        384
    }

    fn encoding(&self) -> TextEncoding {
        TextEncoding::Gbk
    }

    fn finish(&self, builder: &mut EscPosBuilder) {
        builder.feed(4).buzzer(2, 4);
    }
}

/// 80mm printer with an auto cutter
#[derive(Debug, Clone, Copy, Default)]
pub struct TmT88;

impl Dialect for TmT88 {
    fn name(&self) -> &'static str {
        "TM-T88"
    }

    fn columns(&self) -> usize {
        48
    }

    fn dot_width(&self) -> u32 {
        512
    }

    fn encoding(&self) -> TextEncoding {
        TextEncoding::Cp1252
    }

    fn finish(&self, builder: &mut EscPosBuilder) {
        builder.cut_feed(4);
    }
}

/// Names accepted by [`dialect_by_name`]
pub const PROFILE_NAMES: [&str; 3] = ["POS-5890", "NT-5890K", "TM-T88"];

/// Look up a profile by its configuration name (case-insensitive)
pub fn dialect_by_name(name: &str) -> PrintResult<Box<dyn Dialect>> {
    match name.trim().to_ascii_uppercase().as_str() {
        "POS-5890" => Ok(Box::new(Pos5890)),
        "NT-5890K" => Ok(Box::new(Nt5890k)),
        "TM-T88" => Ok(Box::new(TmT88)),
        other => Err(PrintError::InvalidConfig(format!(
            "Unknown printer profile '{}', expected one of {}",
            other,
            PROFILE_NAMES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        for name in PROFILE_NAMES {
            assert_eq!(dialect_by_name(name).unwrap().name(), name);
        }
        assert_eq!(dialect_by_name("nt-5890k").unwrap().name(), "NT-5890K");
        assert!(matches!(
            dialect_by_name("LX-300"),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_geometry() {
        let pos = dialect_by_name("POS-5890").unwrap();
        assert_eq!((pos.columns(), pos.dot_width()), (32, 384));
        let tm = dialect_by_name("TM-T88").unwrap();
        assert_eq!((tm.columns(), tm.dot_width()), (48, 512));
        assert_eq!(dialect_by_name("NT-5890K").unwrap().encoding(), TextEncoding::Gbk);
    }

    #[test]
    fn test_finish_sequences() {
        let mut b = EscPosBuilder::new(32);
        Nt5890k.finish(&mut b);
        assert!(b.build_raw().ends_with(&[0x1B, 0x64, 4, 0x1B, 0x42, 2, 4]));

        let mut b = EscPosBuilder::new(48);
        TmT88.finish(&mut b);
        assert!(b.build_raw().ends_with(&[0x1D, 0x56, 0x42, 4]));

        let mut b = EscPosBuilder::new(32);
        Pos5890.finish(&mut b);
        assert!(b.build_raw().ends_with(&[0x1B, 0x64, 4]));
    }
}
