use crate::error::MailError;
use crate::model::{Reagent, format_quantity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[cfg(feature = "web")]
use handlebars::Handlebars;
#[cfg(feature = "web")]
use lettre::transport::smtp::authentication::Credentials;
#[cfg(feature = "web")]
use lettre::transport::smtp::client::{Tls, TlsParameters};
#[cfg(feature = "web")]
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Fields of the low-stock email template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockAlert {
    pub to_email: String,
    pub reagent_name: String,
    pub brand: String,
    pub current_stock: String,
    pub unit: String,
    pub min_stock: String,
    pub timestamp: String,
}

impl LowStockAlert {
    pub fn for_reagent(reagent: &Reagent, to_email: &str, at: DateTime<Utc>) -> Self {
        LowStockAlert {
            to_email: to_email.to_string(),
            reagent_name: reagent.name.clone(),
            brand: reagent.brand.clone(),
            current_stock: format_quantity(reagent.current_stock),
            unit: reagent.base_unit.clone(),
            min_stock: format_quantity(reagent.min_stock),
            timestamp: at.format("%d/%m/%Y %H:%M").to_string(),
        }
    }

    /// Template parameters as a flat string map
    pub fn params(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("to_email", self.to_email.clone()),
            ("reagent_name", self.reagent_name.clone()),
            ("brand", self.brand.clone()),
            ("current_stock", self.current_stock.clone()),
            ("unit", self.unit.clone()),
            ("min_stock", self.min_stock.clone()),
            ("timestamp", self.timestamp.clone()),
        ])
    }

    /// Stock level shown in the notification log, e.g. `"400 mL"`
    pub fn stock_level(&self) -> String {
        format!("{} {}", self.current_stock, self.unit)
    }
}

/// Sends the low-stock email; one attempt, no retry
#[async_trait]
pub trait AlertMailer: Send + Sync {
    async fn send_low_stock(&self, alert: &LowStockAlert) -> Result<(), MailError>;
}

/// Used when no email transport is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait]
impl AlertMailer for DisabledMailer {
    async fn send_low_stock(&self, _alert: &LowStockAlert) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

/// Records alerts instead of sending them; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<LowStockAlert>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        RecordingMailer {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<LowStockAlert> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertMailer for RecordingMailer {
    async fn send_low_stock(&self, alert: &LowStockAlert) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(alert.clone());
        }
        if self.fail {
            return Err(MailError::Delivery("simulated failure".to_string()));
        }
        Ok(())
    }
}

/// Default endpoint of the hosted transactional email API
#[cfg(feature = "web")]
pub const EMAIL_API_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Hosted transactional email API client
///
/// The provider renders its own template identified by `template_id`;
/// only the field map is sent.
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct EmailApiMailer {
    client: reqwest::Client,
    endpoint: String,
    service_id: String,
    template_id: String,
    public_key: String,
}

#[cfg(feature = "web")]
#[derive(Serialize)]
struct EmailApiRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: BTreeMap<&'static str, String>,
}

#[cfg(feature = "web")]
impl EmailApiMailer {
    pub fn new(endpoint: &str, service_id: &str, template_id: &str, public_key: &str) -> Self {
        EmailApiMailer {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            service_id: service_id.to_string(),
            template_id: template_id.to_string(),
            public_key: public_key.to_string(),
        }
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl AlertMailer for EmailApiMailer {
    async fn send_low_stock(&self, alert: &LowStockAlert) -> Result<(), MailError> {
        let body = EmailApiRequest {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.public_key,
            template_params: alert.params(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MailError::Delivery(format!("status {}: {}", status, text)));
        }
        Ok(())
    }
}

#[cfg(feature = "web")]
const ALERT_SUBJECT: &str = "Alerta de stock bajo: {{reagent_name}}";

#[cfg(feature = "web")]
const ALERT_BODY: &str = "El reactivo {{reagent_name}} ({{brand}}) ha alcanzado su stock mínimo.

Stock actual: {{current_stock}} {{unit}}
Stock mínimo: {{min_stock}} {{unit}}
Fecha: {{timestamp}}

Mensaje generado automáticamente por ReagentFlow.";

/// SMTP relay mailer
///
/// Renders the alert locally and sends it over an authenticated relay.
#[cfg(feature = "web")]
pub struct SmtpMailer {
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    templates: Handlebars<'static>,
}

#[cfg(feature = "web")]
impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from: &str,
    ) -> Result<Self, MailError> {
        let creds = Credentials::new(username.to_string(), password.to_string());

        let smtp = if port == 465 {
            let tls_parameters = TlsParameters::new(host.to_string())
                .map_err(|e| MailError::Delivery(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
                .credentials(creds)
                .port(port)
                .tls(Tls::Wrapper(tls_parameters))
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
                .credentials(creds)
                .port(port)
                .build()
        };

        Ok(SmtpMailer {
            smtp,
            from: from.to_string(),
            templates: alert_templates()?,
        })
    }

    /// Render `(subject, body)` for an alert
    pub fn render(&self, alert: &LowStockAlert) -> Result<(String, String), MailError> {
        render_alert(&self.templates, alert)
    }
}

#[cfg(feature = "web")]
fn alert_templates() -> Result<Handlebars<'static>, MailError> {
    let mut hb = Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.set_strict_mode(true);
    hb.register_template_string("subject", ALERT_SUBJECT)
        .map_err(|e| MailError::Template(e.to_string()))?;
    hb.register_template_string("body", ALERT_BODY)
        .map_err(|e| MailError::Template(e.to_string()))?;
    Ok(hb)
}

#[cfg(feature = "web")]
fn render_alert(
    hb: &Handlebars<'static>,
    alert: &LowStockAlert,
) -> Result<(String, String), MailError> {
    let subject = hb
        .render("subject", alert)
        .map_err(|e| MailError::Template(e.to_string()))?;
    let body = hb
        .render("body", alert)
        .map_err(|e| MailError::Template(e.to_string()))?;
    Ok((subject, body))
}

#[cfg(feature = "web")]
#[async_trait]
impl AlertMailer for SmtpMailer {
    async fn send_low_stock(&self, alert: &LowStockAlert) -> Result<(), MailError> {
        let (subject, body) = self.render(alert)?;
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e: lettre::address::AddressError| MailError::Delivery(e.to_string()))?,
            )
            .to(alert
                .to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::Delivery(e.to_string()))?)
            .subject(subject)
            .body(body)
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        self.smtp
            .send(email)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Build the mailer selected by the configuration
#[cfg(feature = "web")]
pub fn from_settings(
    settings: &crate::config::EmailSettings,
) -> Result<std::sync::Arc<dyn AlertMailer>, MailError> {
    use crate::config::EmailSettings;
    use std::sync::Arc;

    Ok(match settings {
        EmailSettings::Disabled => {
            log::warn!("no email transport configured, low stock alerts will be logged as FAILED");
            Arc::new(DisabledMailer)
        }
        EmailSettings::Api {
            endpoint,
            service_id,
            template_id,
            public_key,
        } => Arc::new(EmailApiMailer::new(
            endpoint.as_deref().unwrap_or(EMAIL_API_ENDPOINT),
            service_id,
            template_id,
            public_key,
        )),
        EmailSettings::Smtp {
            host,
            port,
            username,
            password,
            from,
        } => Arc::new(SmtpMailer::new(host, *port, username, password, from)?),
    })
}
