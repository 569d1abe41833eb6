//! Maildir-backed mail store
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<store>/<folder>/{new,cur}/<message files>
//! <root>/Outbox/                     sent items, one .eml file each
//! ```
//!
//! Every top-level directory except `Outbox` and dot-directories is a store.
//! A message in `new/` is unread; a message in `cur/` is unread unless its
//! info suffix (`:2,<flags>`) carries the `S` flag. Messages are parsed with
//! `mailparse`; outgoing items are built with `lettre` and spooled to the
//! outbox.

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{Address, FileTransport, Message, Transport};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail, SingleInfo};
use tracing::{debug, info, warn};

use super::{
    ItemAttachment, ItemClass, MailFolder, MailItem, MailStore, OutgoingAccount, OutgoingItem,
    Sender, StoreConnection, StoreError, StoreResult,
};

/// Directory under the root that receives sent items
pub const OUTBOX_DIR: &str = "Outbox";

/// Wrap width for HTML-only bodies
const HTML_TEXT_WIDTH: usize = 100;

/// Store rooted at a directory of Maildir folders
#[derive(Debug, Clone)]
pub struct MaildirStore {
    root: PathBuf,
    accounts: Vec<OutgoingAccount>,
}

impl MaildirStore {
    pub fn new(root: impl Into<PathBuf>, accounts: Vec<OutgoingAccount>) -> Self {
        Self {
            root: root.into(),
            accounts,
        }
    }
}

impl MailStore for MaildirStore {
    fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        if !self.root.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "mail store root {} is not a directory",
                self.root.display()
            )));
        }
        debug!(root = %self.root.display(), "opened maildir store");
        Ok(Box::new(MaildirConnection {
            root: self.root.clone(),
            accounts: self.accounts.clone(),
        }))
    }
}

struct MaildirConnection {
    root: PathBuf,
    accounts: Vec<OutgoingAccount>,
}

impl MaildirConnection {
    fn store_dir(&self, store: &str) -> Option<PathBuf> {
        if store.is_empty() || store.starts_with('.') || store.contains(['/', '\\']) {
            return None;
        }
        let dir = self.root.join(store);
        dir.is_dir().then_some(dir)
    }

    fn default_sender(&self) -> StoreResult<&OutgoingAccount> {
        self.accounts.first().ok_or_else(|| {
            StoreError::Rejected("no outgoing account is configured".to_owned())
        })
    }
}

impl StoreConnection for MaildirConnection {
    fn top_level_stores(&self) -> StoreResult<Vec<String>> {
        let mut names = subdirectories(&self.root)?
            .into_iter()
            .filter(|name| name != OUTBOX_DIR)
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn child_folder<'c>(
        &'c self,
        store: &str,
        name: &str,
    ) -> StoreResult<Option<Box<dyn MailFolder + 'c>>> {
        let Some(store_dir) = self.store_dir(store) else {
            return Ok(None);
        };
        let found = subdirectories(&store_dir)?
            .into_iter()
            .filter(|dir| dir.eq_ignore_ascii_case(name))
            .map(|dir| store_dir.join(dir))
            .find(|path| is_maildir(path));
        Ok(found.map(|path| {
            Box::new(MaildirFolder {
                name: folder_name(&path),
                path,
            }) as Box<dyn MailFolder + 'c>
        }))
    }

    fn accounts(&self) -> StoreResult<Vec<OutgoingAccount>> {
        Ok(self.accounts.clone())
    }

    fn send(&self, item: &OutgoingItem) -> StoreResult<OutgoingAccount> {
        let account = match &item.send_using {
            Some(account) => account,
            None => self.default_sender()?,
        };
        let from_address: Address = account.smtp_address.parse().map_err(|e| {
            StoreError::Rejected(format!("invalid sender address {}: {e}", account.smtp_address))
        })?;
        let to: Mailbox = item
            .to
            .parse()
            .map_err(|e| StoreError::Rejected(format!("invalid recipient {}: {e}", item.to)))?;

        let email = Message::builder()
            .from(Mailbox::new(Some(account.display_name.clone()), from_address))
            .to(to)
            .subject(item.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(item.body.clone())
            .map_err(|e| StoreError::Rejected(format!("cannot build message: {e}")))?;

        let outbox = self.root.join(OUTBOX_DIR);
        fs::create_dir_all(&outbox)?;
        let id = FileTransport::new(&outbox)
            .send(&email)
            .map_err(|e| StoreError::Rejected(format!("cannot spool message: {e}")))?;
        info!(%id, outbox = %outbox.display(), from = %account.smtp_address, "spooled outgoing message");
        Ok(account.clone())
    }
}

struct MaildirFolder {
    name: String,
    path: PathBuf,
}

impl MailFolder for MaildirFolder {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn item_count(&self) -> StoreResult<usize> {
        Ok(self.entries()?.len())
    }

    fn items<'f>(&'f self, unread_only: bool) -> StoreResult<Vec<Box<dyn MailItem + 'f>>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|item| !unread_only || item.unread)
            .map(|item| Box::new(item) as Box<dyn MailItem + 'f>)
            .collect())
    }
}

impl MaildirFolder {
    /// Messages from `new/` then `cur/`, each in filename order
    fn entries(&self) -> StoreResult<Vec<MaildirItem>> {
        let mut out = Vec::new();
        for sub in ["new", "cur"] {
            let dir = self.path.join(sub);
            if !dir.is_dir() {
                continue;
            }
            let mut files = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if file_name.starts_with('.') || !entry.file_type()?.is_file() {
                    continue;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok();
                files.push((file_name, entry.path(), modified));
            }
            files.sort_by(|a, b| a.0.cmp(&b.0));
            out.extend(files.into_iter().map(|(file_name, path, modified)| {
                let unread = sub == "new" || !has_seen_flag(&file_name);
                MaildirItem::new(path, &file_name, unread, modified)
            }));
        }
        Ok(out)
    }
}

/// Header fields read once per item
#[derive(Debug, Default)]
struct HeaderFields {
    subject: Option<String>,
    from: Option<SingleInfo>,
    sender: Option<SingleInfo>,
    to: Option<String>,
    cc: Option<String>,
    date: Option<String>,
    content_type: Option<String>,
    content_class: Option<String>,
}

struct MaildirItem {
    path: PathBuf,
    unique_name: String,
    unread: bool,
    delivered: Option<DateTime<Utc>>,
    raw: OnceCell<Vec<u8>>,
    headers: OnceCell<HeaderFields>,
}

impl MaildirItem {
    fn new(path: PathBuf, file_name: &str, unread: bool, modified: Option<SystemTime>) -> Self {
        let unique_name = unique_name(file_name).to_owned();
        let delivered = delivery_time(&unique_name).or_else(|| modified.map(DateTime::<Utc>::from));
        Self {
            path,
            unique_name,
            unread,
            delivered,
            raw: OnceCell::new(),
            headers: OnceCell::new(),
        }
    }

    fn raw(&self) -> StoreResult<&[u8]> {
        if let Some(raw) = self.raw.get() {
            return Ok(raw);
        }
        let bytes = fs::read(&self.path)?;
        Ok(self.raw.get_or_init(|| bytes))
    }

    fn headers(&self) -> StoreResult<&HeaderFields> {
        if let Some(headers) = self.headers.get() {
            return Ok(headers);
        }
        let (parsed, _) = mailparse::parse_headers(self.raw()?)
            .map_err(|e| StoreError::Parse(format!("message headers: {e}")))?;
        let fields = HeaderFields {
            subject: parsed.get_first_value("Subject"),
            from: parsed
                .get_first_value("From")
                .and_then(|v| first_mailbox(&v)),
            sender: parsed
                .get_first_value("Sender")
                .and_then(|v| first_mailbox(&v)),
            to: parsed.get_first_value("To"),
            cc: parsed.get_first_value("Cc"),
            date: parsed.get_first_value("Date"),
            content_type: parsed.get_first_value("Content-Type"),
            content_class: parsed.get_first_value("Content-Class"),
        };
        Ok(self.headers.get_or_init(|| fields))
    }

    fn parsed(&self) -> StoreResult<ParsedMail<'_>> {
        mailparse::parse_mail(self.raw()?).map_err(|e| StoreError::Parse(format!("message: {e}")))
    }
}

impl MailItem for MaildirItem {
    fn entry_id(&self) -> StoreResult<Option<String>> {
        Ok(Some(self.unique_name.clone()))
    }

    fn item_class(&self) -> StoreResult<ItemClass> {
        let headers = self.headers()?;
        let ctype = headers
            .content_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let class = headers
            .content_class
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();

        Ok(if ctype.starts_with("text/calendar") || class.contains("calendarmessage") {
            ItemClass::MeetingRequest
        } else if ctype.starts_with("multipart/report") {
            ItemClass::Report
        } else if class.is_empty() || class.starts_with("urn:content-classes:message") {
            ItemClass::Mail
        } else {
            ItemClass::Other
        })
    }

    fn subject(&self) -> StoreResult<Option<String>> {
        Ok(self.headers()?.subject.clone())
    }

    fn sender_name(&self) -> StoreResult<Option<String>> {
        Ok(self
            .headers()?
            .from
            .as_ref()
            .and_then(|f| f.display_name.clone())
            .filter(|n| !n.trim().is_empty()))
    }

    fn sender_email_address(&self) -> StoreResult<Option<String>> {
        Ok(self.headers()?.from.as_ref().map(|f| f.addr.clone()))
    }

    fn sender(&self) -> StoreResult<Option<Sender>> {
        let headers = self.headers()?;
        Ok(headers
            .sender
            .as_ref()
            .or(headers.from.as_ref())
            .map(|info| Sender {
                name: info.display_name.clone(),
                address: Some(info.addr.clone()),
            }))
    }

    fn to(&self) -> StoreResult<Option<String>> {
        Ok(self.headers()?.to.clone())
    }

    fn cc(&self) -> StoreResult<Option<String>> {
        Ok(self.headers()?.cc.clone())
    }

    fn sent_on(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let Some(date) = self.headers()?.date.as_deref() else {
            return Ok(None);
        };
        let secs = mailparse::dateparse(date).map_err(|e| StoreError::Field {
            field: "sent_on",
            reason: e.to_string(),
        })?;
        Ok(DateTime::from_timestamp(secs, 0))
    }

    fn received_time(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.delivered)
    }

    fn body(&self) -> StoreResult<Option<String>> {
        let parsed = self.parsed()?;
        let mut text = None;
        let mut html = None;
        let mut attachments = Vec::new();
        walk_parts(&parsed, &mut text, &mut html, &mut attachments);
        Ok(text.or_else(|| {
            html.and_then(|h| html2text::from_read(h.as_bytes(), HTML_TEXT_WIDTH).ok())
        }))
    }

    fn is_unread(&self) -> StoreResult<bool> {
        Ok(self.unread)
    }

    fn attachments<'i>(&'i self) -> StoreResult<Vec<Box<dyn ItemAttachment + 'i>>> {
        let parsed = self.parsed()?;
        let mut text = None;
        let mut html = None;
        let mut attachments = Vec::new();
        walk_parts(&parsed, &mut text, &mut html, &mut attachments);
        Ok(attachments
            .into_iter()
            .map(|a| Box::new(a) as Box<dyn ItemAttachment + 'i>)
            .collect())
    }
}

/// An attachment part; a body that failed to decode fails only this attachment
struct MaildirAttachment {
    name: Option<String>,
    data: Result<Vec<u8>, String>,
}

impl MaildirAttachment {
    fn data(&self) -> StoreResult<&[u8]> {
        self.data
            .as_deref()
            .map_err(|e| StoreError::Parse(format!("attachment body: {e}")))
    }
}

impl ItemAttachment for MaildirAttachment {
    fn file_name(&self) -> StoreResult<Option<String>> {
        Ok(self.name.clone())
    }

    fn size(&self) -> StoreResult<Option<u64>> {
        Ok(u64::try_from(self.data()?.len()).ok())
    }

    fn save_as_file(&self, path: &Path) -> StoreResult<()> {
        fs::write(path, self.data()?)?;
        Ok(())
    }
}

/// Collect the first plain and HTML bodies and every attachment, depth-first
fn walk_parts(
    part: &ParsedMail<'_>,
    text: &mut Option<String>,
    html: &mut Option<String>,
    attachments: &mut Vec<MaildirAttachment>,
) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk_parts(sub, text, html, attachments);
        }
        return;
    }

    let ctype = part.ctype.mimetype.to_ascii_lowercase();
    let disposition = part.get_content_disposition();
    let name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();

    if disposition.disposition == DispositionType::Attachment || name.is_some() {
        let data = part.get_body_raw().map_err(|e| e.to_string());
        if let Err(e) = &data {
            warn!(filename = ?name, error = %e, "cannot decode attachment body");
        }
        attachments.push(MaildirAttachment { name, data });
        return;
    }

    if ctype == "text/plain"
        && text.is_none()
        && let Ok(body) = part.get_body()
    {
        *text = Some(body);
    } else if ctype == "text/html"
        && html.is_none()
        && let Ok(body) = part.get_body()
    {
        *html = Some(body);
    }
}

fn first_mailbox(value: &str) -> Option<SingleInfo> {
    let list = match mailparse::addrparse(value) {
        Ok(list) => list,
        Err(e) => {
            warn!(value, error = %e, "unparseable address header");
            return None;
        }
    };
    list.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.clone()),
        MailAddr::Group(group) => group.addrs.first().cloned(),
    })
}

fn subdirectories(dir: &Path) -> StoreResult<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') && entry.file_type()?.is_dir() {
            out.push(name);
        }
    }
    Ok(out)
}

fn is_maildir(path: &Path) -> bool {
    path.join("cur").is_dir() || path.join("new").is_dir()
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Message file name without its info suffix
fn unique_name(file_name: &str) -> &str {
    file_name
        .split_once([':', '!'])
        .map_or(file_name, |(unique, _)| unique)
}

fn has_seen_flag(file_name: &str) -> bool {
    file_name
        .split_once([':', '!'])
        .and_then(|(_, info)| info.strip_prefix("2,"))
        .is_some_and(|flags| flags.contains('S'))
}

/// Delivery time encoded as the leading seconds of a Maildir unique name
fn delivery_time(unique: &str) -> Option<DateTime<Utc>> {
    let secs = unique.split('.').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(secs, 0)
}
