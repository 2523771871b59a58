use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;
use crate::services::notifications::{Notification, Notifier};

const PRODUCT_NAME: &str = "OpsDesk";

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Rendered message, ready for the transport.
struct Rendered {
    subject: String,
    text: String,
    html: String,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    fn wrap_html(content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{PRODUCT_NAME}</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:520px">
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px">
              {content}
            </td>
          </tr>
          <tr>
            <td align="center" style="padding-top:20px">
              <p style="margin:0;font-size:12px;color:#94a3b8">{PRODUCT_NAME}</p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    fn button(url: &str, label: &str) -> String {
        let url = Self::escape_html(url);
        format!(
            r#"<table role="presentation" cellpadding="0" cellspacing="0" style="margin-bottom:28px">
  <tr>
    <td style="border-radius:8px;background:#2563eb">
      <a href="{url}" style="display:inline-block;padding:13px 28px;color:#ffffff;text-decoration:none;font-weight:600;font-size:15px;border-radius:8px">{label}</a>
    </td>
  </tr>
</table>"#
        )
    }

    fn expiry(at: &DateTime<Utc>) -> String {
        at.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    /// Text and URLs placed into the HTML part go through here.
    fn escape_html(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(c),
            }
        }
        out
    }

    fn render(notification: &Notification) -> Rendered {
        match notification {
            Notification::LoginAlert {
                name,
                ip,
                user_agent,
                at,
                ..
            } => {
                let when = at.format("%Y-%m-%d %H:%M UTC");
                let (html_name, html_ip, html_agent) = (
                    Self::escape_html(name),
                    Self::escape_html(ip),
                    Self::escape_html(user_agent),
                );
                Rendered {
                    subject: format!("New sign-in to your {PRODUCT_NAME} account"),
                    text: format!(
                        "Hi {name},\n\n\
                        Your account was just signed in to.\n\
                        When: {when}\nIP address: {ip}\nDevice: {user_agent}\n\n\
                        If this wasn't you, reset your password and sign out of all devices."
                    ),
                    html: Self::wrap_html(&format!(
                        r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">New sign-in</h1>
<p style="margin:0 0 20px 0;font-size:15px;color:#64748b;line-height:1.6">Hi <strong>{html_name}</strong>, your account was just signed in to.</p>
<p style="margin:0 0 20px 0;font-size:14px;color:#334155;line-height:1.6">When: {when}<br>IP address: {html_ip}<br>Device: {html_agent}</p>
<p style="margin:0;font-size:13px;color:#94a3b8">If this wasn't you, reset your password and sign out of all devices.</p>"#
                    )),
                }
            }
            Notification::PasswordReset {
                name,
                reset_url,
                expires_at,
                ..
            } => {
                let until = Self::expiry(expires_at);
                Rendered {
                    subject: format!("Reset your {PRODUCT_NAME} password"),
                    text: format!(
                        "Hi {name},\n\n\
                        Use this link to choose a new password (valid until {until}):\n\
                        {reset_url}\n\n\
                        If you didn't ask for this, you can ignore this email."
                    ),
                    html: Self::wrap_html(&format!(
                        r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Reset your password</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hi <strong>{html_name}</strong>, use the button below to choose a new password.</p>
{button}
<p style="margin:0;font-size:13px;color:#94a3b8">This link expires at {until}. If you didn't ask for this, ignore this email.</p>"#,
                        html_name = Self::escape_html(name),
                        button = Self::button(reset_url, "Reset password"),
                    )),
                }
            }
            Notification::PasswordChanged { name, .. } => Rendered {
                subject: format!("Your {PRODUCT_NAME} password was changed"),
                text: format!(
                    "Hi {name},\n\n\
                    Your password was just changed and every signed-in device was signed out.\n\n\
                    If you didn't do this, contact your workspace administrator right away."
                ),
                html: Self::wrap_html(&format!(
                    r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Password changed</h1>
<p style="margin:0 0 20px 0;font-size:15px;color:#64748b;line-height:1.6">Hi <strong>{html_name}</strong>, your password was just changed and every signed-in device was signed out.</p>
<p style="margin:0;font-size:13px;color:#94a3b8">If you didn't do this, contact your workspace administrator right away.</p>"#,
                    html_name = Self::escape_html(name),
                )),
            },
            Notification::EmailVerification {
                name,
                verify_url,
                expires_at,
                ..
            } => {
                let until = Self::expiry(expires_at);
                Rendered {
                    subject: format!("Confirm your {PRODUCT_NAME} email address"),
                    text: format!(
                        "Hi {name},\n\n\
                        Confirm your email address with this link (valid until {until}):\n\
                        {verify_url}"
                    ),
                    html: Self::wrap_html(&format!(
                        r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Confirm your email</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hi <strong>{html_name}</strong>, please confirm this is your email address.</p>
{button}
<p style="margin:0;font-size:13px;color:#94a3b8">This link expires at {until}.</p>"#,
                        html_name = Self::escape_html(name),
                        button = Self::button(verify_url, "Confirm email"),
                    )),
                }
            }
            Notification::Invitation {
                inviter_name,
                role,
                accept_url,
                expires_at,
                ..
            } => {
                let until = Self::expiry(expires_at);
                Rendered {
                    subject: format!("{inviter_name} invited you to {PRODUCT_NAME}"),
                    text: format!(
                        "{inviter_name} invited you to join their {PRODUCT_NAME} workspace as {role}.\n\n\
                        Create your account here (valid until {until}):\n\
                        {accept_url}"
                    ),
                    html: Self::wrap_html(&format!(
                        r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">You're invited</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6"><strong>{html_inviter}</strong> invited you to join their workspace as <strong>{html_role}</strong>.</p>
{button}
<p style="margin:0;font-size:13px;color:#94a3b8">This invitation expires at {until}.</p>"#,
                        html_inviter = Self::escape_html(inviter_name),
                        html_role = Self::escape_html(role),
                        button = Self::button(accept_url, "Accept invitation"),
                    )),
                }
            }
        }
    }

    async fn send_email(&self, to: Mailbox, rendered: Rendered) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(rendered.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(rendered.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(rendered.html),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let to: Mailbox = notification
            .recipient()
            .parse()
            .with_context(|| format!("invalid recipient address {}", notification.recipient()))?;
        self.send_email(to, Self::render(notification)).await
    }
}
