pub mod scan_mailbox;

pub use scan_mailbox::{ScanMailboxJobHandler, ScanMailboxPayload};
