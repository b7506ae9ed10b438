//! Channel providers backed by external vendors.
//!
//! Email goes out over SMTP, SMS and phone verification through the Twilio
//! REST API. Both are optional: `from_env` returns `None` when the vendor is
//! not configured and the dispatcher simply has no provider for the channel.

pub mod email;
pub mod sms;

pub use email::{EmailConfig, SmtpEmailProvider};
pub use sms::{TwilioConfig, TwilioSmsProvider};
