//! Outbound mail collaborator.
//!
//! The engine resolves templates and recipients, then hands a complete
//! message to the mailer from a detached task so the request is never
//! blocked on SMTP.

/// A fully resolved outbound message.
#[derive(Clone, Debug)]
pub struct MailMessage {
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub body: String,
    /// Blob id of an attachment, if any.
    pub attachment: Option<String>,
    pub attachment_filename: Option<String>,
    /// Trace id propagated from the originating request.
    pub request_id: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: MailMessage);
}

/// Default mailer: logs the message instead of delivering it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: MailMessage) {
        tracing::info!(
            target: "email",
            to = %message.to,
            cc = %message.cc,
            subject = %message.subject,
            request_id = %message.request_id,
            "mail delivery not configured, message dropped"
        );
    }
}
