//! Local map from session address to the mailbox behind it.
//!
//! The TTL store only holds addresses.  This book is how an address is
//! turned back into something a payload can be sent to, and how the
//! directory tells a live owner from one that has stopped.

use std::collections::HashMap;

use parking_lot::RwLock;

use ar_domain::SessionAddress;

use crate::session_actor::SessionMailbox;

#[derive(Default)]
pub struct SessionAddressBook {
    mailboxes: RwLock<HashMap<SessionAddress, SessionMailbox>>,
}

impl SessionAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: SessionAddress, mailbox: SessionMailbox) {
        self.mailboxes.write().insert(address, mailbox);
    }

    pub fn remove(&self, address: &SessionAddress) -> Option<SessionMailbox> {
        self.mailboxes.write().remove(address)
    }

    /// Mailbox for `address` if its actor is still running.
    pub fn live(&self, address: &SessionAddress) -> Option<SessionMailbox> {
        self.mailboxes
            .read()
            .get(address)
            .filter(|mb| !mb.is_closed())
            .cloned()
    }

    pub fn is_live(&self, address: &SessionAddress) -> bool {
        self.live(address).is_some()
    }

    /// Number of running session actors.
    pub fn len(&self) -> usize {
        self.mailboxes
            .read()
            .values()
            .filter(|mb| !mb.is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn closed_mailbox_is_not_live() {
        let book = SessionAddressBook::new();
        let address = SessionAddress::mint();
        let (tx, rx) = mpsc::channel(1);
        book.insert(address.clone(), tx);
        assert!(book.is_live(&address));

        drop(rx);
        assert!(!book.is_live(&address));
        assert_eq!(book.len(), 0);
    }

    #[test]
    fn unknown_address_is_not_live() {
        let book = SessionAddressBook::new();
        assert!(book.live(&SessionAddress::from("session://gone")).is_none());
    }
}
