use super::{LoadState, OnFailure, Snapshot, Ticket};
use crate::api::ApiClient;
use crate::error::{SyncError, TransportError};
use crate::models::Contact;
use crate::observable::Subscription;

/// Contact search results for the most recently issued query.
pub struct ContactsStore {
    snapshot: Snapshot<Vec<Contact>>,
    query: Option<String>,
}

impl Default for ContactsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactsStore {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::new("contacts"),
            query: None,
        }
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.snapshot.value().get()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn state(&self) -> LoadState {
        self.snapshot.state()
    }

    pub fn subscribe(&self, callback: impl FnMut(&Vec<Contact>) + Send + 'static) -> Subscription {
        self.snapshot.value().subscribe(callback)
    }

    pub fn begin_load(&mut self, query: Option<&str>) -> Ticket {
        self.query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        self.snapshot.begin()
    }

    pub fn apply_load(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Contact>, TransportError>,
    ) -> Result<(), SyncError> {
        self.snapshot
            .apply(ticket, result, OnFailure::Clear, Vec::new)
    }

    pub async fn load(&mut self, api: &ApiClient, query: Option<&str>) -> Result<(), SyncError> {
        let ticket = self.begin_load(query);
        let result = api.search_contacts(self.query.as_deref()).await;
        self.apply_load(ticket, result)
    }
}
