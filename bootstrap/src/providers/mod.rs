//! External provider contracts (`SPEC_FULL.md` §6.5): DNS and email, each a
//! dyn-compatible trait with a console-logging stub implementation, grounded
//! on `composable_rust_auth::providers::console_email::ConsoleEmailProvider`'s
//! pattern of a zero-field struct that logs instead of calling out.

pub mod dns;
pub mod email;

pub use dns::{ConsoleDnsProvider, DnsProvider, DnsRecord};
pub use email::{ConsoleEmailProvider, EmailProvider, InvitationEmail};
