//! Mail message model and SendGrid v3 payload conversion

use dispatch_core::Error;
use log::debug;
use serde_json::{json, Map, Value};

/// An email address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Attach a display name
    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Normalize into SendGrid's `{"email": ..., "name": ...}` shape, or
    /// `None` for an address that is not plausibly deliverable.
    fn normalize(&self) -> Option<Value> {
        let email = self.email.trim();
        if !is_valid_email(email) {
            debug!("skipping invalid recipient address");
            return None;
        }

        let mut entry = Map::new();
        entry.insert("email".to_string(), Value::String(email.to_string()));
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            entry.insert("name".to_string(), Value::String(name.to_string()));
        }
        Some(Value::Object(entry))
    }
}

impl From<&str> for Recipient {
    fn from(email: &str) -> Self {
        Recipient::new(email)
    }
}

impl From<String> for Recipient {
    fn from(email: String) -> Self {
        Recipient::new(email)
    }
}

/// Minimal plausibility check: a local part, an `@`, and a dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && domain.contains('.')
}

/// A transactional email, independent of the wire format
///
/// Built fluently; converted to the SendGrid v3 `/mail/send` payload when
/// the message is sent.
#[derive(Debug, Clone)]
pub struct MailMessage {
    from: Recipient,
    to: Vec<Recipient>,
    cc: Vec<Recipient>,
    bcc: Vec<Recipient>,
    subject: Option<String>,
    text_body: Option<String>,
    html_body: Option<String>,
    reply_to: Option<Recipient>,
    headers: Vec<(String, String)>,
}

impl MailMessage {
    /// Create a message from the given sender
    pub fn new(from: impl Into<Recipient>) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            text_body: None,
            html_body: None,
            reply_to: None,
            headers: Vec::new(),
        }
    }

    /// Add a primary recipient
    pub fn to(mut self, recipient: impl Into<Recipient>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Add a carbon-copy recipient
    pub fn cc(mut self, recipient: impl Into<Recipient>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Add a blind-carbon-copy recipient
    pub fn bcc(mut self, recipient: impl Into<Recipient>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Set the subject line
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the plain-text body
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Set the reply-to address
    pub fn reply_to(mut self, recipient: impl Into<Recipient>) -> Self {
        self.reply_to = Some(recipient.into());
        self
    }

    /// Attach a custom SMTP header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Convert into the SendGrid v3 wire payload
    ///
    /// Invalid recipient entries are skipped; an empty `to` list after
    /// normalization is a validation error, raised before any network call.
    pub(crate) fn to_payload(&self, attachments: &[Value]) -> Result<Value, Error> {
        let from = self
            .from
            .normalize()
            .ok_or_else(|| Error::Validation("from address is not a valid email".to_string()))?;

        let to: Vec<Value> = self.to.iter().filter_map(Recipient::normalize).collect();
        if to.is_empty() {
            return Err(Error::Validation(
                "no valid to recipients were provided".to_string(),
            ));
        }

        let mut personalization = Map::new();
        personalization.insert("to".to_string(), Value::Array(to));

        let cc: Vec<Value> = self.cc.iter().filter_map(Recipient::normalize).collect();
        if !cc.is_empty() {
            personalization.insert("cc".to_string(), Value::Array(cc));
        }
        let bcc: Vec<Value> = self.bcc.iter().filter_map(Recipient::normalize).collect();
        if !bcc.is_empty() {
            personalization.insert("bcc".to_string(), Value::Array(bcc));
        }

        let mut payload = Map::new();
        payload.insert("from".to_string(), from);
        payload.insert(
            "personalizations".to_string(),
            Value::Array(vec![Value::Object(personalization)]),
        );

        if let Some(subject) = self.subject.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("subject".to_string(), Value::String(subject.to_string()));
        }

        // Content parts go plain-text first, HTML second; the API rejects
        // other orderings.
        let mut content = Vec::new();
        if let Some(text) = self.text_body.as_deref().filter(|b| !b.is_empty()) {
            content.push(json!({"type": "text/plain", "value": text}));
        }
        if let Some(html) = self.html_body.as_deref().filter(|b| !b.is_empty()) {
            content.push(json!({"type": "text/html", "value": html}));
        }
        if !content.is_empty() {
            payload.insert("content".to_string(), Value::Array(content));
        }

        if !attachments.is_empty() {
            payload.insert(
                "attachments".to_string(),
                Value::Array(attachments.to_vec()),
            );
        }

        if !self.headers.is_empty() {
            let mut headers = Map::new();
            for (key, value) in &self.headers {
                headers.insert(key.clone(), Value::String(value.clone()));
            }
            payload.insert("headers".to_string(), Value::Object(headers));
        }

        if let Some(reply_to) = &self.reply_to {
            let entry = reply_to.normalize().ok_or_else(|| {
                Error::Validation("reply_to address is not a valid email".to_string())
            })?;
            payload.insert("reply_to".to_string(), entry);
        }

        Ok(Value::Object(payload))
    }
}
