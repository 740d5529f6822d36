//! Invitation email delivery (`SPEC_FULL.md` §6.5).

use std::future::Future;
use std::pin::Pin;

use crate::error::ActivityError;

/// The content needed to send one admin invitation email.
#[derive(Debug, Clone)]
pub struct InvitationEmail {
    /// The invitee's address.
    pub to: String,
    /// The organization they're being invited to.
    pub organization_name: String,
    /// The one-time acceptance link.
    pub accept_url: String,
    /// When the invitation expires.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Sends invitation emails. Dyn-compatible so it can be held as
/// `Arc<dyn EmailProvider>` inside the saga's `BootstrapEnvironment`.
pub trait EmailProvider: Send + Sync {
    /// Send one invitation email.
    ///
    /// # Errors
    ///
    /// [`ActivityError::Transient`] for a retryable delivery failure (vendor
    /// 5xx, timeout); [`ActivityError::Terminal`] for a non-retryable one
    /// (invalid address, vendor rejection).
    fn send_invitation(
        &self,
        email: InvitationEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>>;
}

/// Logs invitation emails to the console instead of sending them, grounded on
/// `composable_rust_auth::providers::console_email::ConsoleEmailProvider`.
/// The production choice (SES/Postmark/etc.) is a deployment decision left
/// open by `SPEC_FULL.md` §9; this is what every environment gets until one
/// is wired in.
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailProvider;

impl ConsoleEmailProvider {
    /// Build a console email provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailProvider for ConsoleEmailProvider {
    fn send_invitation(
        &self,
        email: InvitationEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>> {
        Box::pin(async move {
            let expires_minutes = (email.expires_at - chrono::Utc::now()).num_minutes();

            tracing::info!(
                to = %email.to,
                organization = %email.organization_name,
                expires_in = expires_minutes,
                "📧 Invitation Email (console provider)"
            );
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                  ORGANIZATION INVITATION                     ║");
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ To: {:<61}║", email.to);
            println!("║ Organization: {:<50}║", email.organization_name);
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ Accept: {:<57}║", email.accept_url);
            println!("║ Expires in {expires_minutes} minutes{:<38}║", "");
            println!("╚══════════════════════════════════════════════════════════════╝\n");

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_provider_never_fails() {
        let provider = ConsoleEmailProvider::new();
        let result = provider
            .send_invitation(InvitationEmail {
                to: "admin@example.com".to_string(),
                organization_name: "Acme Health".to_string(),
                accept_url: "https://app.example.com/invite/abc123".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::days(7),
            })
            .await;

        assert!(result.is_ok());
    }
}
