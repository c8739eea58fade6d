//! Contact form submissions relayed to the operations mailbox

use common::mailer::{EmailMessage, Mailer, escape_html};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::non_blank;

/// Raw form body; every field may be absent
#[derive(Debug, Default, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub phone: Option<String>,
}

impl ContactRequest {
    /// Fails with `MissingFields` naming every absent or blank required field
    pub fn into_submission(self) -> ApiResult<ContactSubmission> {
        let name = non_blank(self.name);
        let email = non_blank(self.email);
        let subject = non_blank(self.subject);
        let message = non_blank(self.message);

        match (name, email, subject, message) {
            (Some(name), Some(email), Some(subject), Some(message)) => Ok(ContactSubmission {
                name,
                email,
                subject,
                message,
                phone: non_blank(self.phone),
            }),
            (name, email, subject, message) => {
                let missing = [
                    ("name", name.is_none()),
                    ("email", email.is_none()),
                    ("subject", subject.is_none()),
                    ("message", message.is_none()),
                ]
                .into_iter()
                .filter_map(|(field, absent)| absent.then_some(field))
                .collect();
                Err(ApiError::MissingFields(missing))
            }
        }
    }
}

/// Notification sent to `recipient` for a submission
pub fn notification(site_name: &str, recipient: &str, submission: &ContactSubmission) -> EmailMessage {
    let phone = submission.phone.as_deref().unwrap_or("not provided");
    let html = format!(
        "<h2>New contact request</h2>\
         <p><strong>Name:</strong> {}</p>\
         <p><strong>Email:</strong> {}</p>\
         <p><strong>Phone:</strong> {}</p>\
         <p><strong>Subject:</strong> {}</p>\
         <p>{}</p>",
        escape_html(&submission.name),
        escape_html(&submission.email),
        escape_html(phone),
        escape_html(&submission.subject),
        escape_html(&submission.message).replace('\n', "<br>"),
    );
    let text = format!(
        "New contact request\n\nName: {}\nEmail: {}\nPhone: {}\nSubject: {}\n\n{}",
        submission.name, submission.email, phone, submission.subject, submission.message
    );

    let mut message = EmailMessage::new(
        recipient,
        format!("[{site_name}] {}", submission.subject),
        html,
        text,
    );
    message.reply_to = Some(submission.email.clone());
    message
}

/// Relay a submission; returns the provider's message id
pub async fn submit(
    mailer: &dyn Mailer,
    site_name: &str,
    recipient: &str,
    request: ContactRequest,
) -> ApiResult<String> {
    let submission = request.into_submission()?;
    let sent = mailer
        .send(notification(site_name, recipient, &submission))
        .await
        .map_err(ApiError::Delivery)?;

    info!(email_id = %sent.id, "Contact request relayed");
    Ok(sent.id)
}
