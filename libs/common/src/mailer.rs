//! Outbound email
//!
//! `Mailer` is the port the services depend on. `SmtpMailer` delivers through
//! an SMTP relay with `lettre`; `LogMailer` only logs, and is used whenever
//! SMTP is not configured.

use crate::error::MailError;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::info;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM: &str = "Brewline Coffee <no-reply@brewline.local>";

/// A plain-text email ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Why an OTP was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Registration,
    PasswordReset,
}

/// Line of an order confirmation email
#[derive(Debug, Clone)]
pub struct OrderEmailLine {
    pub name: String,
    pub quantity: i32,
    pub price: i64,
}

/// Data rendered into an order confirmation email
#[derive(Debug, Clone)]
pub struct OrderEmail {
    pub order_id: String,
    pub customer_name: String,
    pub email: String,
    pub items: Vec<OrderEmailLine>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub shipping_address: String,
    pub payment_method: String,
}

impl OutboundEmail {
    pub fn otp(to: &str, otp: &str, purpose: OtpPurpose) -> Self {
        let (subject, action) = match purpose {
            OtpPurpose::Registration => ("Verify your account", "finish creating your account"),
            OtpPurpose::PasswordReset => ("Reset your password", "reset your password"),
        };

        let body = format!(
            "Your verification code is {otp}\n\n\
             Enter this code to {action}. It expires in 10 minutes.\n\
             If you did not request it, ignore this email."
        );

        OutboundEmail {
            to: to.to_string(),
            subject: format!("{} - Brewline Coffee", subject),
            body,
        }
    }

    pub fn order_confirmation(order: &OrderEmail) -> Self {
        let short_id: String = order.order_id.chars().take(8).collect::<String>().to_uppercase();

        let mut body = format!("Hi {},\n\nThanks for your order #{}.\n\n", order.customer_name, short_id);
        for line in &order.items {
            body.push_str(&format!(
                "  {} x{}  {}\n",
                line.name,
                line.quantity,
                format_amount(line.price * line.quantity as i64)
            ));
        }
        body.push_str(&format!("\nSubtotal: {}\n", format_amount(order.subtotal)));
        body.push_str(&format!("Shipping: {}\n", format_amount(order.shipping_fee)));
        if order.discount > 0 {
            body.push_str(&format!("Discount: -{}\n", format_amount(order.discount)));
        }
        body.push_str(&format!("Total: {}\n\n", format_amount(order.total)));
        body.push_str(&format!("Ship to: {}\n", order.shipping_address));
        body.push_str(&format!("Payment: {}\n", order.payment_method));

        OutboundEmail {
            to: order.email.clone(),
            subject: format!("Order confirmation #{} - Brewline Coffee", short_id),
            body,
        }
    }
}

/// Group thousands with dots and append the currency sign
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{}đ", grouped)
    } else {
        format!("{}đ", grouped)
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;

    /// Release transport resources
    async fn shutdown(&self) {}
}

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl MailerConfig {
    /// Read SMTP settings; `None` when `SMTP_HOST` is unset
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USER`, `SMTP_PASS`, `EMAIL_FROM`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty())?;

        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);

        Some(MailerConfig {
            host,
            port,
            username: std::env::var("SMTP_USER").ok(),
            password: std::env::var("SMTP_PASS").ok(),
            from: std::env::var("EMAIL_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string()),
        })
    }
}

/// SMTP delivery
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailerConfig) -> Result<Self, MailError> {
        // 465 is implicit TLS, anything else negotiates STARTTLS
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| MailError::Configuration(e.to_string()))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        info!("SMTP mailer configured for {}:{}", config.host, config.port);
        Ok(SmtpMailer {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse::<Mailbox>()
                    .map_err(|e| MailError::Address(format!("{}: {}", self.from, e)))?,
            )
            .to(email
                .to
                .parse::<Mailbox>()
                .map_err(|e| MailError::Address(format!("{}: {}", email.to, e)))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        info!("Email sent: {} to {}", email.subject, email.to);
        Ok(())
    }
}

/// Logs instead of sending
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        info!("SMTP not configured, skipping email: {} to {}", email.subject, email.to);
        Ok(())
    }
}

/// Build the mailer for the current environment
pub fn mailer_from_env() -> Result<Arc<dyn Mailer>, MailError> {
    match MailerConfig::from_env() {
        Some(config) => Ok(Arc::new(SmtpMailer::new(&config)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0đ");
        assert_eq!(format_amount(999), "999đ");
        assert_eq!(format_amount(1000), "1.000đ");
        assert_eq!(format_amount(1_250_000), "1.250.000đ");
        assert_eq!(format_amount(-20_000), "-20.000đ");
    }

    #[test]
    fn test_otp_email_mentions_code() {
        let email = OutboundEmail::otp("a@b.co", "123456", OtpPurpose::PasswordReset);
        assert_eq!(email.to, "a@b.co");
        assert!(email.subject.starts_with("Reset your password"));
        assert!(email.body.contains("123456"));
    }

    #[test]
    fn test_order_confirmation_lists_items() {
        let email = OutboundEmail::order_confirmation(&OrderEmail {
            order_id: "3f2a9c1e-0000-0000-0000-000000000000".to_string(),
            customer_name: "Lan".to_string(),
            email: "lan@example.com".to_string(),
            items: vec![OrderEmailLine {
                name: "Latte".to_string(),
                quantity: 2,
                price: 45_000,
            }],
            subtotal: 90_000,
            shipping_fee: 20_000,
            discount: 0,
            total: 110_000,
            shipping_address: "12 Tran Hung Dao, Ha Noi".to_string(),
            payment_method: "cod".to_string(),
        });

        assert!(email.subject.contains("#3F2A9C1E"));
        assert!(email.body.contains("Latte x2  90.000đ"));
        assert!(email.body.contains("Total: 110.000đ"));
        assert!(!email.body.contains("Discount"));
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let mailer = LogMailer;
        let result = mailer
            .send(OutboundEmail::otp("a@b.co", "000000", OtpPurpose::Registration))
            .await;
        assert!(result.is_ok());
    }
}
