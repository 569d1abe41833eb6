//! In-memory driver for tests
//!
//! Scriptable stand-in for a real mail client: tracks connect/release counts,
//! captures sent items and can simulate unreachable stores, unreadable fields,
//! released references and failing attachments.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use super::{
    ItemAttachment, ItemClass, MailFolder, MailItem, MailStore, OutgoingAccount, OutgoingItem,
    Sender, StoreConnection, StoreError, StoreResult,
};

/// Timestamp helper for fixtures
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid fixture timestamp")
}

#[derive(Debug, Clone)]
pub struct MemoryAttachment {
    pub name: Option<String>,
    pub data: Vec<u8>,
    pub fail_save: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub entry_id: Option<String>,
    pub class: ItemClass,
    pub subject: Option<String>,
    pub subject_unreadable: bool,
    pub sender_name: Option<String>,
    pub sender_email_address: Option<String>,
    pub sender: Option<Sender>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub sent_on: Option<DateTime<Utc>>,
    pub received_time: Option<DateTime<Utc>>,
    pub body: Option<String>,
    pub unread: bool,
    pub disposed: bool,
    pub attachments: Vec<MemoryAttachment>,
}

impl MemoryItem {
    /// Unread mail item with a subject, a sender and a received time
    pub fn mail(subject: &str, received_secs: i64) -> Self {
        Self {
            entry_id: Some(format!("mem-{received_secs}")),
            class: ItemClass::Mail,
            subject: Some(subject.to_owned()),
            subject_unreadable: false,
            sender_name: Some("Alice Sender".to_owned()),
            sender_email_address: Some("alice@example.com".to_owned()),
            sender: None,
            to: Some("ops@example.com".to_owned()),
            cc: None,
            sent_on: Some(at(received_secs - 60)),
            received_time: Some(at(received_secs)),
            body: Some(format!("Body of {subject}")),
            unread: true,
            disposed: false,
            attachments: Vec::new(),
        }
    }

    /// Item with every optional field missing
    pub fn bare() -> Self {
        Self {
            entry_id: None,
            class: ItemClass::Mail,
            subject: None,
            subject_unreadable: false,
            sender_name: None,
            sender_email_address: None,
            sender: None,
            to: None,
            cc: None,
            sent_on: None,
            received_time: None,
            body: None,
            unread: true,
            disposed: false,
            attachments: Vec::new(),
        }
    }

    pub fn read(mut self) -> Self {
        self.unread = false;
        self
    }

    pub fn class(mut self, class: ItemClass) -> Self {
        self.class = class;
        self
    }

    pub fn attachment(mut self, name: &str, data: &[u8]) -> Self {
        self.attachments.push(MemoryAttachment {
            name: Some(name.to_owned()),
            data: data.to_vec(),
            fail_save: false,
        });
        self
    }

    pub fn failing_attachment(mut self, name: &str) -> Self {
        self.attachments.push(MemoryAttachment {
            name: Some(name.to_owned()),
            data: Vec::new(),
            fail_save: true,
        });
        self
    }

    fn guard(&self) -> StoreResult<()> {
        if self.disposed {
            Err(StoreError::Disposed("message".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    mailboxes: RefCell<Vec<(String, Vec<(String, Vec<MemoryItem>)>)>>,
    accounts: RefCell<Vec<OutgoingAccount>>,
    sent: RefCell<Vec<OutgoingItem>>,
    connects: Cell<usize>,
    releases: Cell<usize>,
    unavailable: Cell<bool>,
    reject_sends: RefCell<Option<String>>,
}

/// Cloneable handle to a shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Rc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level store named `account` with an `Inbox` holding `items`
    pub fn with_inbox(self, account: &str, items: Vec<MemoryItem>) -> Self {
        self.state
            .mailboxes
            .borrow_mut()
            .push((account.to_owned(), vec![("Inbox".to_owned(), items)]));
        self
    }

    /// Add a top-level store without any child folder
    pub fn with_empty_store(self, account: &str) -> Self {
        self.state
            .mailboxes
            .borrow_mut()
            .push((account.to_owned(), Vec::new()));
        self
    }

    pub fn with_account(self, display_name: &str, smtp_address: &str) -> Self {
        self.state.accounts.borrow_mut().push(OutgoingAccount {
            display_name: display_name.to_owned(),
            smtp_address: smtp_address.to_owned(),
        });
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.set(unavailable);
    }

    pub fn reject_sends(&self, reason: &str) {
        *self.state.reject_sends.borrow_mut() = Some(reason.to_owned());
    }

    pub fn sent(&self) -> Vec<OutgoingItem> {
        self.state.sent.borrow().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.get()
    }

    pub fn releases(&self) -> usize {
        self.state.releases.get()
    }
}

impl MailStore for MemoryStore {
    fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        if self.state.unavailable.get() {
            return Err(StoreError::Unavailable(
                "mail application is not running".to_owned(),
            ));
        }
        self.state.connects.set(self.state.connects.get() + 1);
        Ok(Box::new(MemoryConnection {
            state: Rc::clone(&self.state),
        }))
    }
}

struct MemoryConnection {
    state: Rc<MemoryState>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.releases.set(self.state.releases.get() + 1);
    }
}

impl StoreConnection for MemoryConnection {
    fn top_level_stores(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .state
            .mailboxes
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn child_folder<'c>(
        &'c self,
        store: &str,
        name: &str,
    ) -> StoreResult<Option<Box<dyn MailFolder + 'c>>> {
        let mailboxes = self.state.mailboxes.borrow();
        let folder = mailboxes
            .iter()
            .find(|(n, _)| n == store)
            .and_then(|(_, folders)| folders.iter().find(|(f, _)| f == name))
            .map(|(f, items)| MemoryFolder {
                name: f.clone(),
                items: items.clone(),
            });
        Ok(folder.map(|f| Box::new(f) as Box<dyn MailFolder + 'c>))
    }

    fn accounts(&self) -> StoreResult<Vec<OutgoingAccount>> {
        Ok(self.state.accounts.borrow().clone())
    }

    /// Sends from `send_using`, else the first configured account, else a
    /// built-in `Default` profile
    fn send(&self, item: &OutgoingItem) -> StoreResult<OutgoingAccount> {
        if let Some(reason) = self.state.reject_sends.borrow().clone() {
            return Err(StoreError::Rejected(reason));
        }
        let used = item
            .send_using
            .clone()
            .or_else(|| self.state.accounts.borrow().first().cloned())
            .unwrap_or_else(|| OutgoingAccount {
                display_name: "Default".to_owned(),
                smtp_address: "default@localhost".to_owned(),
            });
        self.state.sent.borrow_mut().push(item.clone());
        Ok(used)
    }
}

struct MemoryFolder {
    name: String,
    items: Vec<MemoryItem>,
}

impl MailFolder for MemoryFolder {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn item_count(&self) -> StoreResult<usize> {
        Ok(self.items.len())
    }

    fn items<'f>(&'f self, unread_only: bool) -> StoreResult<Vec<Box<dyn MailItem + 'f>>> {
        Ok(self
            .items
            .iter()
            .filter(|item| !unread_only || item.unread)
            .map(|item| Box::new(MemoryItemRef(item)) as Box<dyn MailItem + 'f>)
            .collect())
    }
}

struct MemoryItemRef<'f>(&'f MemoryItem);

impl MailItem for MemoryItemRef<'_> {
    fn entry_id(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.entry_id.clone())
    }

    fn item_class(&self) -> StoreResult<ItemClass> {
        self.0.guard()?;
        Ok(self.0.class)
    }

    fn subject(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        if self.0.subject_unreadable {
            return Err(StoreError::Field {
                field: "subject",
                reason: "property is not available".to_owned(),
            });
        }
        Ok(self.0.subject.clone())
    }

    fn sender_name(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.sender_name.clone())
    }

    fn sender_email_address(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.sender_email_address.clone())
    }

    fn sender(&self) -> StoreResult<Option<Sender>> {
        self.0.guard()?;
        Ok(self.0.sender.clone())
    }

    fn to(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.to.clone())
    }

    fn cc(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.cc.clone())
    }

    fn sent_on(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.0.guard()?;
        Ok(self.0.sent_on)
    }

    fn received_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.0.guard()?;
        Ok(self.0.received_time)
    }

    fn body(&self) -> StoreResult<Option<String>> {
        self.0.guard()?;
        Ok(self.0.body.clone())
    }

    fn is_unread(&self) -> StoreResult<bool> {
        self.0.guard()?;
        Ok(self.0.unread)
    }

    fn attachments<'i>(&'i self) -> StoreResult<Vec<Box<dyn ItemAttachment + 'i>>> {
        self.0.guard()?;
        Ok(self
            .0
            .attachments
            .iter()
            .map(|a| Box::new(MemoryAttachmentRef(a)) as Box<dyn ItemAttachment + 'i>)
            .collect())
    }
}

struct MemoryAttachmentRef<'i>(&'i MemoryAttachment);

impl ItemAttachment for MemoryAttachmentRef<'_> {
    fn file_name(&self) -> StoreResult<Option<String>> {
        Ok(self.0.name.clone())
    }

    fn size(&self) -> StoreResult<Option<u64>> {
        Ok(Some(self.0.data.len() as u64))
    }

    fn save_as_file(&self, path: &Path) -> StoreResult<()> {
        if self.0.fail_save {
            return Err(StoreError::Io(std::io::Error::other(
                "attachment transfer failed",
            )));
        }
        std::fs::write(path, &self.0.data)?;
        Ok(())
    }
}
