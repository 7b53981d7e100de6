use std::time::Duration;

use chrono::Utc;
use community_payment_engine::{db_types::InviteLink, InviteApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the invite expiry worker, which marks unused invite codes past their expiry date as `EXPIRED`.
/// Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_invite_expiry_worker(db: SqliteDatabase, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = InviteApi::new(db);
        info!("🕰️ Invite expiry worker started. Sweeping every {} s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running invite expiry job");
            match api.expire_stale_invites(Utc::now()).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No invite codes expired"),
                Ok(expired) => {
                    info!("🕰️ {} invite codes expired", expired.len());
                    debug!("🕰️ Expired invite codes: {}", invite_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running invite expiry job: {e}");
                },
            }
        }
    })
}

fn invite_list(invites: &[InviteLink]) -> String {
    invites
        .iter()
        .map(|i| format!("[{}] code: {} inviter: {}", i.id, i.code, i.inviter_id))
        .collect::<Vec<String>>()
        .join(", ")
}
