use super::{LoadState, OnFailure, Snapshot, Ticket};
use crate::api::ApiClient;
use crate::error::{SyncError, TransportError};
use crate::models::Settings;
use crate::observable::Subscription;

/// User settings. Starts from the backend's seed values; a failed load keeps
/// whatever was shown before.
pub struct SettingsStore {
    snapshot: Snapshot<Settings>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::new("settings"),
        }
    }

    pub fn settings(&self) -> Settings {
        self.snapshot.value().get()
    }

    pub fn state(&self) -> LoadState {
        self.snapshot.state()
    }

    pub fn subscribe(&self, callback: impl FnMut(&Settings) + Send + 'static) -> Subscription {
        self.snapshot.value().subscribe(callback)
    }

    pub fn begin_load(&mut self) -> Ticket {
        self.snapshot.begin()
    }

    pub fn apply_load(
        &mut self,
        ticket: Ticket,
        result: Result<Settings, TransportError>,
    ) -> Result<(), SyncError> {
        let fallback = self.settings();
        self.snapshot
            .apply(ticket, result, OnFailure::Keep, move || fallback)
    }

    pub async fn load(&mut self, api: &ApiClient) -> Result<(), SyncError> {
        let ticket = self.begin_load();
        let result = api.get_settings().await;
        self.apply_load(ticket, result)
    }

    /// Like [`apply_load`](Self::apply_load) but hands back the settings this
    /// request returned, even when a later request has already been applied.
    pub fn apply_echo(
        &mut self,
        ticket: Ticket,
        result: Result<Settings, TransportError>,
    ) -> Result<Settings, SyncError> {
        let echoed = result.as_ref().ok().copied();
        self.apply_load(ticket, result)?;
        Ok(echoed.unwrap_or_else(|| self.settings()))
    }

    /// Replace settings on the server and adopt what it echoes back.
    pub async fn save(&mut self, api: &ApiClient, settings: Settings) -> Result<Settings, SyncError> {
        let ticket = self.begin_load();
        let result = api.replace_settings(&settings).await;
        self.apply_echo(ticket, result)
    }
}
