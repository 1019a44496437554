pub mod body;
pub mod client;
pub mod errors;
pub mod token;
pub mod types;

pub use client::MailboxClient;
pub use errors::MailboxError;
pub use token::TokenManager;
pub use types::{Message, MessageRef};
