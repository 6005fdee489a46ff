use crate::protocol::{EmailAddress, SimpleEmail};
use crate::smtp::{SmtpError, SmtpResult};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    Address, Message,
};

/// Email message builder with MIME support
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    subject: String,
    body_text: String,
    body_html: Option<String>,
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body_text: String::new(),
            body_html: None,
        }
    }

    /// Prefill every field from a `SimpleSMTPEmail` command
    pub fn from_simple_email(email: &SimpleEmail) -> SmtpResult<Self> {
        let mut builder = Self::new()
            .from(to_mailbox(&email.sender)?)
            .subject(email.subject.clone())
            .body_text(email.text_body.clone());

        for to in &email.recipients {
            builder = builder.to(to_mailbox(to)?);
        }
        for cc in &email.cc_recipients {
            builder = builder.cc(to_mailbox(cc)?);
        }
        for bcc in &email.bcc_recipients {
            builder = builder.bcc(to_mailbox(bcc)?);
        }
        if let Some(html) = &email.html_body {
            builder = builder.body_html(html.clone());
        }

        Ok(builder)
    }

    /// Set the sender
    pub fn from(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    /// Add a To recipient
    pub fn to(mut self, to: Mailbox) -> Self {
        self.to.push(to);
        self
    }

    /// Add a Cc recipient
    pub fn cc(mut self, cc: Mailbox) -> Self {
        self.cc.push(cc);
        self
    }

    /// Add a Bcc recipient
    pub fn bcc(mut self, bcc: Mailbox) -> Self {
        self.bcc.push(bcc);
        self
    }

    pub fn subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body_text<S: Into<String>>(mut self, body: S) -> Self {
        self.body_text = body.into();
        self
    }

    pub fn body_html<S: Into<String>>(mut self, body: S) -> Self {
        self.body_html = Some(body.into());
        self
    }

    /// Build the message
    pub fn build(self) -> SmtpResult<Message> {
        let from = self
            .from
            .ok_or_else(|| SmtpError::MessageFormatError("From address is required".to_string()))?;

        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(SmtpError::MessageFormatError(
                "At least one recipient is required".to_string(),
            ));
        }

        let mut message_builder = Message::builder()
            .from(from)
            .subject(self.subject)
            .user_agent(format!("mailgate/{}", env!("CARGO_PKG_VERSION")))
            .date_now();

        for to in self.to {
            message_builder = message_builder.to(to);
        }

        for cc in self.cc {
            message_builder = message_builder.cc(cc);
        }

        for bcc in self.bcc {
            message_builder = message_builder.bcc(bcc);
        }

        let message = if let Some(html_body) = self.body_html {
            let text_part = SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(self.body_text);

            let html_part = SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html_body);

            let multipart = MultiPart::alternative()
                .singlepart(text_part)
                .singlepart(html_part);

            message_builder.multipart(multipart)
        } else {
            message_builder
                .header(ContentType::TEXT_PLAIN)
                .body(self.body_text)
        };

        message.map_err(SmtpError::MessageBuildError)
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a wire address into a lettre mailbox
pub fn to_mailbox(address: &EmailAddress) -> SmtpResult<Mailbox> {
    let parsed: Address = address
        .address
        .trim()
        .parse()
        .map_err(|_| SmtpError::InvalidAddress(address.address.clone()))?;
    let name = address
        .name
        .as_ref()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, parsed))
}

/// Build the RFC 5322 message for a `SimpleSMTPEmail` command
pub fn build_message(email: &SimpleEmail) -> SmtpResult<Message> {
    MessageBuilder::from_simple_email(email)?.build()
}
