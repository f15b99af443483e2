// libs/scheduling-cell/src/services/holds.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{SchedulingError, SlotHold, SlotKey, ACTIVE_STATUS_FILTER};

#[derive(Default)]
struct HoldTable {
    by_slot: HashMap<SlotKey, SlotHold>,
    by_token: HashMap<Uuid, SlotKey>,
    /// Tokens mid-redeem: their slot stays claimed while the appointment row
    /// is persisted, and they cannot expire, be released or redeemed again.
    consuming: HashSet<Uuid>,
}

impl HoldTable {
    fn remove(&mut self, token: Uuid) -> Option<SlotHold> {
        let key = self.by_token.remove(&token)?;
        self.by_slot.remove(&key)
    }
}

/// Owner of every slot hold. All mutation goes through one async mutex, the
/// single critical section that makes two concurrent `create_hold` calls for
/// the same tuple yield exactly one winner. The persistent-appointment probe
/// runs under that same lock.
pub struct SlotHoldService {
    supabase: Arc<SupabaseClient>,
    table: Mutex<HoldTable>,
}

impl SlotHoldService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            table: Mutex::new(HoldTable::default()),
        }
    }

    /// Claim a slot for one checkout session. Fails with `SlotTaken` when an
    /// unexpired hold or a non-terminal appointment already occupies the
    /// tuple. Expired-but-unswept holds are reclaimed here as if absent.
    pub async fn create_hold(
        &self,
        doctor_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Result<SlotHold, SchedulingError> {
        let key = SlotKey { doctor_id, date, time };

        let mut table = self.table.lock().await;

        if let Some(existing) = table.by_slot.get(&key) {
            if existing.is_expired(now) && !table.consuming.contains(&existing.token) {
                let stale = existing.token;
                table.remove(stale);
                debug!("Reclaimed expired hold {} for {:?} {}", stale, date, time);
            } else {
                return Err(SchedulingError::SlotTaken);
            }
        }

        if self.slot_has_active_appointment(doctor_id, date, time).await? {
            warn!(
                "Hold rejected, slot already booked: doctor {} on {} at {}",
                doctor_id, date, time
            );
            return Err(SchedulingError::SlotTaken);
        }

        let hold = SlotHold::issue(doctor_id, service_id, date, time, duration_minutes, now);
        table.by_token.insert(hold.token, key.clone());
        table.by_slot.insert(key, hold.clone());

        info!(
            "Hold {} created for doctor {} on {} at {}, expires {}",
            hold.token, doctor_id, date, time, hold.expires_at
        );
        Ok(hold)
    }

    /// First half of redemption: validates the token and marks it consuming.
    /// The slot stays claimed until `commit_redeem` (appointment persisted)
    /// or `abort_redeem` (persistence failed, hold goes back to waiting out
    /// its TTL). Tokens are single-use: a second `begin_redeem` fails.
    pub async fn begin_redeem(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SlotHold, SchedulingError> {
        let mut table = self.table.lock().await;

        let key = table
            .by_token
            .get(&token)
            .cloned()
            .ok_or(SchedulingError::HoldNotFound)?;
        let hold = table
            .by_slot
            .get(&key)
            .cloned()
            .ok_or(SchedulingError::HoldNotFound)?;

        if hold.is_expired(now) {
            // Lazy reclaim: expiry wins over redemption even if the sweeper
            // never ran.
            table.remove(token);
            debug!("Redeem of expired hold {} rejected", token);
            return Err(SchedulingError::HoldNotFound);
        }

        if !table.consuming.insert(token) {
            return Err(SchedulingError::HoldNotFound);
        }

        Ok(hold)
    }

    /// Second half of redemption: the appointment row exists, drop the hold.
    pub async fn commit_redeem(&self, token: Uuid) {
        let mut table = self.table.lock().await;
        table.consuming.remove(&token);
        if table.remove(token).is_some() {
            info!("Hold {} redeemed", token);
        }
    }

    /// Persistence failed mid-redeem; the hold returns to its normal
    /// lifecycle and simply expires if the client never retries.
    pub async fn abort_redeem(&self, token: Uuid) {
        let mut table = self.table.lock().await;
        table.consuming.remove(&token);
        debug!("Redeem of hold {} aborted", token);
    }

    /// Explicit early release (patient navigates back). Idempotent: unknown,
    /// expired and already-released tokens all report `false`, never an
    /// error.
    pub async fn release_hold(&self, token: Uuid) -> bool {
        let mut table = self.table.lock().await;

        if table.consuming.contains(&token) {
            return false;
        }

        match table.remove(token) {
            Some(_) => {
                info!("Hold {} released", token);
                true
            }
            None => false,
        }
    }

    /// Unexpired holds for one doctor-day, as the availability calculator
    /// consumes them. Mid-redeem holds count: their slot is still claimed.
    pub async fn active_holds(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<SlotHold> {
        let table = self.table.lock().await;
        table
            .by_slot
            .values()
            .filter(|h| h.doctor_id == doctor_id && h.date == date && !h.is_expired(now))
            .cloned()
            .collect()
    }

    /// Housekeeping pass. Correctness never depends on it running: every
    /// read path applies the expiry predicate itself.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.table.lock().await;

        let expired: Vec<Uuid> = table
            .by_slot
            .values()
            .filter(|h| h.is_expired(now) && !table.consuming.contains(&h.token))
            .map(|h| h.token)
            .collect();

        for token in &expired {
            table.remove(*token);
        }

        if !expired.is_empty() {
            info!("Swept {} expired slot holds", expired.len());
        }
        expired.len()
    }

    /// Periodic sweeper task; 60s in production.
    pub fn spawn_sweeper(self: &Arc<Self>, period: StdDuration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                service.sweep_expired(Utc::now()).await;
            }
        })
    }

    async fn slot_has_active_appointment(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&time=eq.{}&{}&select=id",
            doctor_id, date, time, ACTIVE_STATUS_FILTER
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        Ok(!rows.is_empty())
    }
}
