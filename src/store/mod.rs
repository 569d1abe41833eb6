//! Mail-store driver capability surface
//!
//! The toolkit never talks to a concrete mail client directly. It consumes the
//! small set of capabilities below: connect to the application, enumerate the
//! top-level stores, open a child folder, enumerate items, read typed item
//! fields, enumerate and save attachments, enumerate configured accounts and
//! send a new outgoing item.
//!
//! Lifetimes carry the binding discipline: folders borrow the connection that
//! produced them and items borrow their folder, so no reference can outlive
//! the store session it came from.

pub mod maildir;
#[cfg(test)]
pub mod memory;

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Driver-level failure
///
/// Converted into [`crate::errors::AppError`] at component boundaries, or
/// swallowed where a single item's failure must not abort the operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The mail-store application cannot be reached
    #[error("{0}")]
    Unavailable(String),
    /// The reference was used after its binding was released
    #[error("{0} reference has been released")]
    Disposed(String),
    /// A single field could not be read
    #[error("cannot read field '{field}': {reason}")]
    Field { field: &'static str, reason: String },
    /// Item content could not be parsed
    #[error("parse failure: {0}")]
    Parse(String),
    /// Filesystem failure inside the driver
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The store refused an outgoing item
    #[error("{0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of item found in a folder
///
/// Only [`ItemClass::Mail`] items are candidates for subject matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Mail,
    MeetingRequest,
    Report,
    Other,
}

/// Address-bearing sender object, distinct from the direct sender address field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// An outgoing account configured in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAccount {
    pub display_name: String,
    pub smtp_address: String,
}

/// A new outgoing item ready to be sent
#[derive(Debug, Clone)]
pub struct OutgoingItem {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Account to send from; `None` lets the store use its default account
    pub send_using: Option<OutgoingAccount>,
}

/// Entry point of a driver: connects to the mail-store application
pub trait MailStore {
    /// Establish a connection and open its namespace
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` when the application is not running or
    /// access is denied.
    fn connect(&self) -> StoreResult<Box<dyn StoreConnection>>;
}

/// A live connection to the store; dropping it closes the connection
pub trait StoreConnection {
    /// Names of the top-level stores (one per configured mailbox)
    fn top_level_stores(&self) -> StoreResult<Vec<String>>;

    /// Child folder `name` of the top-level store `store`, if present
    fn child_folder<'c>(
        &'c self,
        store: &str,
        name: &str,
    ) -> StoreResult<Option<Box<dyn MailFolder + 'c>>>;

    /// Outgoing accounts configured in the store
    fn accounts(&self) -> StoreResult<Vec<OutgoingAccount>>;

    /// Create and send a new outgoing item, returning the account it was sent from
    fn send(&self, item: &OutgoingItem) -> StoreResult<OutgoingAccount>;
}

/// A folder reference, valid only while its connection lives
pub trait MailFolder {
    fn name(&self) -> String;

    /// Number of items in the folder, regardless of class or read state
    fn item_count(&self) -> StoreResult<usize>;

    /// Items in the store's native order, optionally restricted to unread ones
    fn items<'f>(&'f self, unread_only: bool) -> StoreResult<Vec<Box<dyn MailItem + 'f>>>;
}

/// A live mail item with typed accessors
///
/// `Ok(None)` means the store has no value for the field; `Err` means the
/// value could not be read at all.
pub trait MailItem {
    fn entry_id(&self) -> StoreResult<Option<String>>;
    fn item_class(&self) -> StoreResult<ItemClass>;
    fn subject(&self) -> StoreResult<Option<String>>;
    fn sender_name(&self) -> StoreResult<Option<String>>;
    fn sender_email_address(&self) -> StoreResult<Option<String>>;
    fn sender(&self) -> StoreResult<Option<Sender>>;
    fn to(&self) -> StoreResult<Option<String>>;
    fn cc(&self) -> StoreResult<Option<String>>;
    fn sent_on(&self) -> StoreResult<Option<DateTime<Utc>>>;
    fn received_time(&self) -> StoreResult<Option<DateTime<Utc>>>;
    fn body(&self) -> StoreResult<Option<String>>;
    fn is_unread(&self) -> StoreResult<bool>;

    /// Attachments in the store's native order (position 0 is attachment 1)
    fn attachments<'i>(&'i self) -> StoreResult<Vec<Box<dyn ItemAttachment + 'i>>>;
}

/// One attachment of a mail item
pub trait ItemAttachment {
    fn file_name(&self) -> StoreResult<Option<String>>;

    /// Size as reported by the store (not necessarily the size on disk)
    fn size(&self) -> StoreResult<Option<u64>>;

    /// Write the attachment's bytes to `path`
    fn save_as_file(&self, path: &Path) -> StoreResult<()>;
}
