// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::DetectError;
use crate::{
    model::{Peer, SoftforkStatus},
    notify::{Event, Notifier},
    rpc::responses::{BlockchainInfo, SoftforkReport},
    store::Store,
};

/// Tracks the deployment status each peer reports for every named soft fork.
#[derive(Copy, Clone, Debug, Default)]
pub struct SoftforkDetector;

impl SoftforkDetector {
    /// Returns the statuses whose change was notified.
    #[instrument(skip_all, fields(peer = %peer.id), err)]
    pub async fn check(
        &self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        peer: &Peer,
        info: &BlockchainInfo,
        now: OffsetDateTime,
    ) -> Result<Vec<SoftforkStatus>, DetectError> {
        let mut notified = Vec::new();
        for report in info.softfork_reports() {
            if report.fork_type == "buried" {
                continue;
            }
            let previous = store.softfork(peer.id, &report.name).await?;
            let mut status = to_status(peer, report);

            match &previous {
                Some(previous) if previous.status == status.status => {
                    if previous.bit != status.bit || previous.since != status.since {
                        status.notified_at = previous.notified_at;
                        store.upsert_softfork(&status).await?;
                    }
                    continue;
                }
                None if status.status == "defined" => {
                    debug!("recording soft fork {}", status.name);
                    store.upsert_softfork(&status).await?;
                    continue;
                }
                _ => (),
            }

            // Every change is its own notification.
            status.notified_at = Some(now);
            store.upsert_softfork(&status).await?;
            let previous = previous.map(|p| p.status);
            info!(
                "soft fork {} changed from {} to {}",
                status.name,
                previous.as_deref().unwrap_or("unknown"),
                status.status
            );
            notifier
                .notify(&Event::Softfork {
                    peer: peer.clone(),
                    status: status.clone(),
                    previous,
                })
                .await?;
            notified.push(status);
        }
        Ok(notified)
    }
}

fn to_status(peer: &Peer, report: SoftforkReport) -> SoftforkStatus {
    SoftforkStatus {
        peer: peer.id,
        network: peer.network,
        name: report.name,
        fork_type: Some(report.fork_type),
        status: report.status,
        bit: report.bit,
        since: report.since,
        notified_at: None,
    }
}
