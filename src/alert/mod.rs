//! Alert composition and delivery

pub mod composer;
pub mod notifier;

pub use composer::{MessageComposer, MAX_MESSAGE_CHARS, TRUNCATION_NOTICE};
pub use notifier::{Notifier, TelegramNotifier};
