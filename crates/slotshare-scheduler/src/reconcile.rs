//! Reconciliation loop.
//!
//! Every tick, in order:
//! 1. refresh agent node infos (full slot sync when due, heartbeats always)
//! 2. collect persisted agent-node records nobody declares any more
//! 3. persist the blacklist if it changed

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use slotshare_core::AgentRoleName;
use slotshare_state::compress::{compress, decompress};
use slotshare_state::{StateResult, BLACKLIST_KEY};

use crate::blacklist::Blacklist;
use crate::error::SchedulerResult;
use crate::scheduler::AgentSharingScheduler;

impl AgentSharingScheduler {
    /// Run one reconciliation tick.
    pub fn reconcile_once(&self) {
        self.update_agent_node_infos();
        self.clear_useless_persisted_nodes();
        self.serialize_blacklist_data();
    }

    /// Tick until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.loop_interval();
        info!(
            app = %self.app,
            interval_secs = period.as_secs(),
            "reconciliation loop started"
        );

        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reconcile_once();
                }
                _ = shutdown.changed() => {
                    info!("reconciliation loop shutting down");
                    break;
                }
            }
        }
        // Last chance to get pending blacklist changes to disk.
        self.serialize_blacklist_data();
    }

    pub(crate) fn update_agent_node_infos(&self) {
        let mut state = self.state.lock();
        let now = self.now();
        let due = state
            .last_full_sync
            .is_none_or(|last| now.saturating_sub(last) >= self.config.full_sync_interval_secs);
        if due {
            self.sync_all_role_slots(&mut state);
        }
        self.nodes.sync_nodes_status();
    }

    /// Delete persisted agent-node records that are not declared agent roles
    /// of this application. Runs once per GC interval.
    pub(crate) fn clear_useless_persisted_nodes(&self) {
        let now = self.now();
        let declared = {
            let mut state = self.state.lock();
            match state.last_gc {
                None => {
                    state.last_gc = Some(now);
                    return;
                }
                Some(last) if now.saturating_sub(last) < self.config.gc_interval_secs => return,
                Some(_) => {}
            }
            state.last_gc = Some(now);
            state.agents.names()
        };

        let persisted = match self.nodes.list_persisted_nodes() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list persisted agent nodes");
                return;
            }
        };

        let mut removed = 0;
        for name in persisted {
            let useful = AgentRoleName::parse(&self.app, &name).is_ok()
                && declared.binary_search(&name).is_ok();
            if useful {
                continue;
            }
            match self.nodes.remove_persisted_node(&name) {
                Ok(_) => {
                    debug!(agent = %name, "persisted agent node removed");
                    removed += 1;
                }
                Err(e) => warn!(agent = %name, error = %e, "failed to remove persisted agent node"),
            }
        }
        if removed > 0 {
            info!(removed, "useless persisted agent nodes collected");
        }
    }

    /// Write the blacklist if it changed since the last write.
    ///
    /// The store write happens outside the lock. Returns true when a write
    /// succeeded.
    pub(crate) fn serialize_blacklist_data(&self) -> bool {
        let Some(snapshot) = self.snapshot_blacklist() else {
            return false;
        };
        let written = self.write_blacklist(&snapshot);
        self.commit_blacklist(snapshot.version, written)
    }

    fn snapshot_blacklist(&self) -> Option<BlacklistSnapshot> {
        let state = self.state.lock();
        if !state.blacklist_dirty() {
            return None;
        }
        match state.blacklist.to_json() {
            Ok(json) => Some(BlacklistSnapshot {
                version: state.blacklist.version(),
                json,
            }),
            Err(e) => {
                error!(error = %e, "failed to encode blacklist");
                None
            }
        }
    }

    fn write_blacklist(&self, snapshot: &BlacklistSnapshot) -> StateResult<usize> {
        let bytes = compress(&snapshot.json)?;
        self.store.put_blob(BLACKLIST_KEY, &bytes)?;
        Ok(bytes.len())
    }

    /// Record the outcome of a write of blacklist `version`. The blacklist
    /// stays dirty on failure or if it changed since the snapshot.
    fn commit_blacklist(&self, version: u64, written: StateResult<usize>) -> bool {
        match written {
            Ok(size) => {
                let mut state = self.state.lock();
                state.persisted_bytes = size;
                if state.blacklist.version() == version {
                    state.persisted_version = version;
                }
                debug!(bytes = size, version, "blacklist persisted");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to persist blacklist, will retry");
                false
            }
        }
    }

    /// Load the persisted blacklist, replacing the in-memory one.
    ///
    /// Unreadable data leaves an empty blacklist. Returns the number of
    /// recovered entries.
    pub fn recover_blacklist(&self) -> usize {
        let data = match self.store.get_blob(BLACKLIST_KEY) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("no persisted blacklist");
                return 0;
            }
            Err(e) => {
                error!(error = %e, "failed to read persisted blacklist");
                return 0;
            }
        };

        let mut state = self.state.lock();
        match decode_blacklist(&data) {
            Ok((blacklist, dropped)) => {
                if dropped > 0 {
                    warn!(dropped, "malformed blacklist entries skipped");
                }
                let count = blacklist.len();
                state.persisted_version = blacklist.version();
                state.persisted_bytes = data.len();
                state.blacklist = blacklist;
                info!(entries = count, "blacklist recovered");
                count
            }
            Err(e) => {
                error!(error = %e, "persisted blacklist unreadable, starting empty");
                state.blacklist = Blacklist::new();
                state.persisted_version = state.blacklist.version();
                0
            }
        }
    }
}

struct BlacklistSnapshot {
    version: u64,
    json: Vec<u8>,
}

fn decode_blacklist(data: &[u8]) -> SchedulerResult<(Blacklist, usize)> {
    let raw = decompress(data)?;
    let recovered = Blacklist::from_json(&raw)?;
    Ok((recovered.blacklist, recovered.dropped))
}
