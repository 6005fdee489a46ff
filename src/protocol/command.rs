use serde::{Deserialize, Serialize};
use std::fmt;

/// A mailbox as carried in `SimpleSMTPEmail` records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }
}

/// Body of a `SimpleSMTPEmail` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleEmail {
    pub sender: EmailAddress,
    #[serde(default)]
    pub recipients: Vec<EmailAddress>,
    #[serde(default)]
    pub cc_recipients: Vec<EmailAddress>,
    #[serde(default)]
    pub bcc_recipients: Vec<EmailAddress>,
    pub subject: String,
    pub text_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
}

impl SimpleEmail {
    /// Every envelope recipient, in To, Cc, Bcc order
    pub fn all_recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.recipients
            .iter()
            .chain(self.cc_recipients.iter())
            .chain(self.bcc_recipients.iter())
    }
}

/// Commands a client can issue over an open stream
///
/// Commands carry no session identity; the stream they arrive on decides
/// which session they act on.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Command {
    #[serde(rename = "SMTPLogin")]
    Login { username: String, password: String },
    #[serde(rename = "SMTPLogout")]
    Logout,
    #[serde(rename = "SimpleSMTPEmail")]
    SendEmail(SimpleEmail),
    #[serde(rename = "StreamKeepAlive")]
    KeepAlive {
        #[serde(rename = "keepAlive")]
        keep_alive: bool,
    },
}

impl Command {
    /// Wire tag of this command
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Login { .. } => "SMTPLogin",
            Command::Logout => "SMTPLogout",
            Command::SendEmail(_) => "SimpleSMTPEmail",
            Command::KeepAlive { .. } => "StreamKeepAlive",
        }
    }

    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Command::Login {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn keep_alive(keep_alive: bool) -> Self {
        Command::KeepAlive { keep_alive }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Command::Logout => write!(f, "Logout"),
            Command::SendEmail(email) => f.debug_tuple("SendEmail").field(email).finish(),
            Command::KeepAlive { keep_alive } => f
                .debug_struct("KeepAlive")
                .field("keep_alive", keep_alive)
                .finish(),
        }
    }
}

/// One inbound JSON line: `{"input": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub input: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_debug_redacts_password() {
        let command = Command::login("alice", "hunter2");
        let rendered = format!("{:?}", command);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_send_email_uses_camel_case_fields() {
        let email = SimpleEmail {
            sender: EmailAddress::new("a@example.com"),
            recipients: vec![EmailAddress::named("Bob", "b@example.com")],
            cc_recipients: vec![],
            bcc_recipients: vec![EmailAddress::new("c@example.com")],
            subject: "Hi".to_string(),
            text_body: "Hello".to_string(),
            html_body: None,
        };
        let value = serde_json::to_value(CommandRecord {
            input: Command::SendEmail(email),
        })
        .unwrap();

        assert_eq!(value["input"]["kind"], "SimpleSMTPEmail");
        assert_eq!(value["input"]["textBody"], "Hello");
        assert_eq!(value["input"]["bccRecipients"][0]["address"], "c@example.com");
        assert!(value["input"].get("htmlBody").is_none());
        assert!(value["input"]["sender"].get("name").is_none());
    }

    #[test]
    fn test_all_recipients_order() {
        let email = SimpleEmail {
            sender: EmailAddress::new("a@example.com"),
            recipients: vec![EmailAddress::new("to@example.com")],
            cc_recipients: vec![EmailAddress::new("cc@example.com")],
            bcc_recipients: vec![EmailAddress::new("bcc@example.com")],
            subject: String::new(),
            text_body: String::new(),
            html_body: None,
        };
        let addresses: Vec<_> = email.all_recipients().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["to@example.com", "cc@example.com", "bcc@example.com"]);
    }
}
