use shared::{Envelope, SubmissionId};

/// One receipt to render, derived from an envelope and dropped afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterJob {
    pub identifier: SubmissionId,
    pub title: Option<String>,
    pub text: String,
    pub image: Option<Vec<u8>>,
}

impl From<Envelope> for PrinterJob {
    fn from(envelope: Envelope) -> Self {
        Self {
            identifier: envelope.identifier,
            title: envelope.title,
            text: envelope.text,
            image: envelope.image,
        }
    }
}

impl PrinterJob {
    /// Footer line identifying the submission on paper
    pub fn footer(&self) -> String {
        format!("#{}", self.identifier)
    }
}
