//! Guestbook receipt renderer
//!
//! Layout, top to bottom:
//!
//! ```text
//!        TITLE            bold, double height, centered
//!       [image]           raster, centered
//! text text text ...      left aligned, word wrapped
//! --------------------------------
//!        #<identifier>    centered
//! ```
//!
//! followed by the profile's finishing sequence (feed, buzzer, cut).

use std::sync::Arc;

use receipt_printer::{Dialect, EscPosBuilder, printable_text, raster_image, wrap_text};
use tracing::warn;

use super::types::PrinterJob;

#[derive(Debug, Clone)]
pub struct ReceiptRenderer {
    dialect: Arc<dyn Dialect>,
}

impl ReceiptRenderer {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    /// Render a job to device bytes in the profile's code page
    ///
    /// An image that fails to decode is left out; the text still prints.
    /// Control characters in the title and text never reach the device.
    pub fn render(&self, job: &PrinterJob) -> Vec<u8> {
        let columns = self.dialect.columns();
        let encoding = self.dialect.encoding();
        let mut b = EscPosBuilder::new(columns);

        b.newline();

        if let Some(title) = &job.title {
            b.center().bold().double_height();
            for line in wrap_text(&printable_text(title), columns, encoding) {
                b.line(&line);
            }
            b.reset_size().bold_off();
        }

        if let Some(image) = &job.image {
            match raster_image(image, self.dialect.dot_width()) {
                Ok(raster) => {
                    b.center().raw(&raster).newline();
                }
                Err(e) => {
                    warn!(identifier = %job.identifier, error = %e, "Image skipped");
                }
            }
        }

        b.left();
        for line in wrap_text(&printable_text(&job.text), columns, encoding) {
            b.line(&line);
        }

        b.sep_single();
        b.center().line(&job.footer()).left();

        self.dialect.finish(&mut b);
        b.build(encoding)
    }
}
