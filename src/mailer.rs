// notification d'activation (journalisée, pas d'envoi SMTP)

use chrono::{DateTime, Utc};

/// Contenu d'un message d'activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    sender: String,
}

impl Mailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }

    pub fn activation_message(
        &self,
        recipient: &str,
        user_id: i64,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> ActivationMessage {
        ActivationMessage {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: "Welcome to Replays!".to_string(),
            body: format!(
                "Thanks for signing up (user id {user_id}).\n\n\
                 To activate your account, send a PUT /v1/users/activated request with:\n\n\
                 {{\"token\": \"{token}\"}}\n\n\
                 This token is valid until {}.",
                expiry.to_rfc3339()
            ),
        }
    }

    /// Le corps contient le token: il n'est visible qu'au niveau debug
    pub fn send_activation(&self, recipient: &str, user_id: i64, token: &str, expiry: DateTime<Utc>) {
        let message = self.activation_message(recipient, user_id, token, expiry);

        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            user_id,
            "activation email dispatched"
        );
        tracing::debug!(body = %message.body, "activation email body");
    }
}
