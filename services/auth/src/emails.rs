//! Transactional email templates for the authentication flows

use common::mailer::{EmailMessage, escape_html};

fn layout(site_name: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family:Arial,sans-serif;max-width:560px;margin:0 auto\">\
         <h2>{}</h2>{}\
         <p style=\"color:#888;font-size:12px\">If you did not request this, you can ignore this email.</p>\
         </div>",
        escape_html(site_name),
        body
    )
}

pub fn verification(site_name: &str, to: &str, name: &str, link: &str) -> EmailMessage {
    let html = layout(
        site_name,
        &format!(
            "<p>Hello {},</p><p>Confirm your email address to finish creating your account.</p>\
             <p><a href=\"{}\">Verify email</a></p><p>This link expires in one hour.</p>",
            escape_html(name),
            escape_html(link)
        ),
    );
    let text = format!(
        "Hello {name},\n\nConfirm your email address to finish creating your account:\n{link}\n\nThis link expires in one hour."
    );
    EmailMessage::new(to, format!("Verify your email for {site_name}"), html, text)
}

pub fn password_reset(site_name: &str, to: &str, name: &str, link: &str) -> EmailMessage {
    let html = layout(
        site_name,
        &format!(
            "<p>Hello {},</p><p>We received a request to reset your password.</p>\
             <p><a href=\"{}\">Choose a new password</a></p><p>This link expires in one hour and can be used once.</p>",
            escape_html(name),
            escape_html(link)
        ),
    );
    let text = format!(
        "Hello {name},\n\nReset your password here:\n{link}\n\nThis link expires in one hour and can be used once."
    );
    EmailMessage::new(to, format!("Reset your {site_name} password"), html, text)
}

pub fn one_time_code(site_name: &str, to: &str, code: &str, minutes: i64) -> EmailMessage {
    let html = layout(
        site_name,
        &format!(
            "<p>Your sign-in code is:</p>\
             <p style=\"font-size:28px;letter-spacing:6px;font-weight:bold\">{}</p>\
             <p>It expires in {} minutes.</p>",
            escape_html(code),
            minutes
        ),
    );
    let text = format!("Your sign-in code is {code}. It expires in {minutes} minutes.");
    EmailMessage::new(to, format!("Your {site_name} sign-in code"), html, text)
}
