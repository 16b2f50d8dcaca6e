use super::{LoadState, OnFailure, Snapshot, Ticket};
use crate::api::ApiClient;
use crate::error::{SyncError, TransportError};
use crate::models::{CallLogEntry, NewCallLog};
use crate::observable::Subscription;

pub struct CallLogStore {
    snapshot: Snapshot<Vec<CallLogEntry>>,
}

impl Default for CallLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CallLogStore {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::new("call_logs"),
        }
    }

    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.snapshot.value().get()
    }

    pub fn state(&self) -> LoadState {
        self.snapshot.state()
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&Vec<CallLogEntry>) + Send + 'static,
    ) -> Subscription {
        self.snapshot.value().subscribe(callback)
    }

    pub fn begin_refresh(&mut self) -> Ticket {
        self.snapshot.begin()
    }

    pub fn apply_refresh(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<CallLogEntry>, TransportError>,
    ) -> Result<(), SyncError> {
        self.snapshot
            .apply(ticket, result, OnFailure::Clear, Vec::new)
    }

    pub async fn refresh(&mut self, api: &ApiClient) -> Result<(), SyncError> {
        let ticket = self.begin_refresh();
        let result = api.list_call_logs().await;
        self.apply_refresh(ticket, result)
    }

    /// Record a call, then reload the log.
    pub async fn append(
        &mut self,
        api: &ApiClient,
        entry: &NewCallLog,
    ) -> Result<CallLogEntry, SyncError> {
        let added = api.append_call_log(entry).await?;
        self.refresh(api).await?;
        Ok(added)
    }
}
