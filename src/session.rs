//! Store session: the scoped binding to the mail-store runtime
//!
//! A [`StoreSession`] owns the one live connection of an operation. It is
//! thread-affine (`!Send`), releases its binding when dropped, and refuses to
//! open a second binding on a thread that already holds one. Folders and items
//! borrow the session, so the borrow checker rejects any attempt to release it
//! while a store reference is still alive.

use std::cell::Cell;
use std::marker::PhantomData;

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::store::{MailStore, StoreConnection};

thread_local! {
    static THREAD_BOUND: Cell<bool> = const { Cell::new(false) };
}

pub struct StoreSession<'s> {
    store: &'s dyn MailStore,
    connection: Option<Box<dyn StoreConnection>>,
    /// Keeps the session on the thread that acquired the binding
    _thread_affine: PhantomData<*const ()>,
}

impl<'s> StoreSession<'s> {
    /// Create an unbound session over `store`
    pub fn new(store: &'s dyn MailStore) -> Self {
        Self {
            store,
            connection: None,
            _thread_affine: PhantomData,
        }
    }

    /// Create a session and acquire its binding immediately
    pub fn open(store: &'s dyn MailStore) -> AppResult<Self> {
        let mut session = Self::new(store);
        session.acquire()?;
        Ok(session)
    }

    /// Bind this session to the store; a no-op when already bound
    ///
    /// # Errors
    ///
    /// `Connection` if the store cannot be reached, or if another session
    /// already holds a binding on this thread. Not retried.
    pub fn acquire(&mut self) -> AppResult<()> {
        if self.is_bound() {
            return Ok(());
        }
        if THREAD_BOUND.get() {
            return Err(AppError::Connection(
                "another store binding is active on this thread".to_owned(),
            ));
        }

        let connection = self.store.connect()?;
        THREAD_BOUND.set(true);
        self.connection = Some(connection);
        debug!("store binding acquired");
        Ok(())
    }

    /// Tear down the binding; a no-op when unbound
    pub fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection);
            THREAD_BOUND.set(false);
            debug!("store binding released");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// The live connection
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the session has been released.
    pub fn connection(&self) -> AppResult<&dyn StoreConnection> {
        self.connection
            .as_deref()
            .ok_or_else(|| AppError::InvalidHandle("store session is not bound".to_owned()))
    }
}

impl Drop for StoreSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
