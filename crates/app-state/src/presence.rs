//! Online-user tracking
//!
//! Joins the shared presence channel as the viewer, mirrors the channel's
//! snapshots into a `watch`-observable list of other online users, and
//! retracts the viewer's entry before the handle is released so no ghost
//! entry lingers for other clients.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use backend_client::presence::{PresenceChannel, PresenceEntry, PresenceStatus, Result};

/// Tracks the viewer on a presence channel and observes everyone else.
pub struct PresenceTracker {
    viewer_id: String,
    viewer_name: String,
    channel: Arc<dyn PresenceChannel>,
    roster_tx: Arc<watch::Sender<Vec<PresenceEntry>>>,
    sync_task: JoinHandle<()>,
}

impl PresenceTracker {
    /// Join the channel as `viewer` and start mirroring its snapshots.
    pub async fn start(
        viewer_id: impl Into<String>,
        viewer_name: impl Into<String>,
        channel: Arc<dyn PresenceChannel>,
    ) -> Result<Self> {
        let viewer_id = viewer_id.into();
        let viewer_name = viewer_name.into();
        channel
            .track(PresenceEntry::online(&viewer_id, &viewer_name))
            .await?;

        let (roster_tx, _) = watch::channel(Vec::new());
        let roster_tx = Arc::new(roster_tx);
        let sync_task = Self::spawn_sync_loop(
            viewer_id.clone(),
            Arc::clone(&channel),
            Arc::clone(&roster_tx),
        );

        let tracker = Self {
            viewer_id,
            viewer_name,
            channel,
            roster_tx,
            sync_task,
        };
        tracker.refresh().await;
        Ok(tracker)
    }

    /// Observe the list of other online users, sorted by name.
    pub fn subscribe(&self) -> watch::Receiver<Vec<PresenceEntry>> {
        self.roster_tx.subscribe()
    }

    /// Current list of other online users.
    pub fn online(&self) -> Vec<PresenceEntry> {
        self.roster_tx.borrow().clone()
    }

    /// Re-publish the viewer's entry with a new status.
    pub async fn set_status(&self, status: PresenceStatus) -> Result<()> {
        let mut entry = PresenceEntry::online(&self.viewer_id, &self.viewer_name);
        entry.status = status;
        self.channel.track(entry).await
    }

    /// Leave the channel: retract the viewer's entry, then stop mirroring.
    ///
    /// The untrack must complete before the handle goes away, otherwise other
    /// clients keep showing the viewer until an external timeout.
    pub async fn stop(self) {
        if let Err(error) = self.channel.untrack().await {
            tracing::warn!(%error, "presence untrack failed");
        }
        self.sync_task.abort();
    }

    async fn refresh(&self) {
        let snapshot = self.channel.state().await;
        publish_roster(&self.viewer_id, snapshot, &self.roster_tx);
    }

    fn spawn_sync_loop(
        viewer_id: String,
        channel: Arc<dyn PresenceChannel>,
        roster_tx: Arc<watch::Sender<Vec<PresenceEntry>>>,
    ) -> JoinHandle<()> {
        let mut sync = channel.on_sync();
        tokio::spawn(async move {
            loop {
                match sync.recv().await {
                    Ok(()) => {
                        // Snapshots are authoritative; recompute wholesale.
                        let snapshot = channel.state().await;
                        publish_roster(&viewer_id, snapshot, &roster_tx);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "presence sync lagged; resnapshotting");
                        let snapshot = channel.state().await;
                        publish_roster(&viewer_id, snapshot, &roster_tx);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn publish_roster(
    viewer_id: &str,
    snapshot: Vec<PresenceEntry>,
    roster_tx: &watch::Sender<Vec<PresenceEntry>>,
) {
    let mut roster: Vec<PresenceEntry> = snapshot
        .into_iter()
        .filter(|entry| entry.id != viewer_id)
        .collect();
    roster.sort_by(|a, b| a.name.cmp(&b.name));
    roster_tx.send_replace(roster);
}
