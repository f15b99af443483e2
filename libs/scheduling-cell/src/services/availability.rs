// libs/scheduling-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailableSlot, ClinicService, DoctorServiceLink, OccupiedSlot, SchedulingError,
    ScheduleWindow, ACTIVE_STATUS_FILTER,
};
use crate::services::holds::SlotHoldService;

/// Computes which slot start times are actually free for a doctor/service
/// pair on one date. Read-only over schedules, blocked dates, appointments
/// and the hold table.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    holds: Arc<SlotHoldService>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>, holds: Arc<SlotHoldService>) -> Self {
        Self { supabase, holds }
    }

    /// Free start times for `doctor_id` performing `service_id` on `date`,
    /// ascending. Empty means fully booked (or closed), not an error. A past
    /// date yields nothing; today excludes times already elapsed on the
    /// server clock.
    pub async fn compute_slots(
        &self,
        doctor_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<NaiveTime>, SchedulingError> {
        debug!("Computing slots for doctor {} on {}", doctor_id, date);

        if date < now.date_naive() {
            return Ok(vec![]);
        }

        if self.is_blocked(date).await? {
            debug!("Date {} is blocked, no slots offered", date);
            return Ok(vec![]);
        }

        let service = self.service(service_id).await?;

        let day_of_week = date.weekday().num_days_from_sunday() as i32;
        let windows = self.windows_for(doctor_id, day_of_week).await?;
        if windows.is_empty() {
            return Ok(vec![]);
        }

        let mut occupied: Vec<(NaiveTime, i32)> = self
            .booked_intervals(doctor_id, date)
            .await?
            .into_iter()
            .map(|slot| (slot.time, slot.duration_minutes))
            .collect();

        for hold in self.holds.active_holds(doctor_id, date, now).await {
            occupied.push((hold.time, hold.duration_minutes));
        }

        let window_ranges: Vec<(NaiveTime, NaiveTime)> = windows
            .iter()
            .map(|w| (w.start_time, w.end_time))
            .collect();

        let earliest = (date == now.date_naive()).then(|| now.time());

        let mut slots = walk_windows(&window_ranges, service.duration_minutes, &occupied, earliest);
        slots.sort();
        slots.dedup();

        debug!("Found {} free slots for doctor {} on {}", slots.len(), doctor_id, date);
        Ok(slots)
    }

    /// Public listing for the booking flow: slots for every doctor who
    /// performs the service, each tagged with its doctor.
    pub async fn slots_for_service(
        &self,
        service_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlot>, SchedulingError> {
        let mut slots = Vec::new();

        for link in self.doctors_for_service(service_id).await? {
            for time in self
                .compute_slots(link.doctor_id, service_id, date, now)
                .await?
            {
                slots.push(AvailableSlot {
                    doctor_id: link.doctor_id,
                    time,
                });
            }
        }

        slots.sort_by(|a, b| (a.time, a.doctor_id).cmp(&(b.time, b.doctor_id)));
        Ok(slots)
    }

    pub async fn service(&self, service_id: Uuid) -> Result<ClinicService, SchedulingError> {
        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        let rows: Vec<ClinicService> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(SchedulingError::ServiceNotFound)
    }

    /// Interval-overlap probe used by staff direct entry, where the
    /// requested time need not sit on the public slot grid.
    pub async fn overlaps_existing(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i32,
    ) -> Result<bool, SchedulingError> {
        let booked = self.booked_intervals(doctor_id, date).await?;
        let candidate = (time, duration_minutes);
        Ok(booked
            .iter()
            .any(|slot| intervals_overlap(candidate, (slot.time, slot.duration_minutes))))
    }

    async fn doctors_for_service(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<DoctorServiceLink>, SchedulingError> {
        let path = format!(
            "/rest/v1/doctor_services?service_id=eq.{}&select=doctor_id",
            service_id
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    async fn is_blocked(&self, date: NaiveDate) -> Result<bool, SchedulingError> {
        let path = format!("/rest/v1/blocked_dates?date=eq.{}&select=date", date);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;
        Ok(!rows.is_empty())
    }

    async fn windows_for(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<ScheduleWindow>, SchedulingError> {
        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            doctor_id, day_of_week
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    async fn booked_intervals(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<OccupiedSlot>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&{}&select=time,duration_minutes",
            doctor_id, date, ACTIVE_STATUS_FILTER
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }
}

/// Walk each working window in service-duration increments and keep the
/// candidates whose occupied interval `[t, t + duration)` touches nothing.
/// `occupied` entries are (start, duration); `earliest` drops candidates
/// before it (used for today's already-elapsed times).
///
/// Arithmetic runs on seconds-from-midnight so intervals never wrap.
pub fn walk_windows(
    windows: &[(NaiveTime, NaiveTime)],
    duration_minutes: i32,
    occupied: &[(NaiveTime, i32)],
    earliest: Option<NaiveTime>,
) -> Vec<NaiveTime> {
    let step = duration_minutes.max(1) as u32 * 60;
    let floor = earliest.map(|e| e.num_seconds_from_midnight());

    let taken: Vec<(u32, u32)> = occupied
        .iter()
        .map(|&(start, minutes)| {
            let s = start.num_seconds_from_midnight();
            (s, s + minutes.max(0) as u32 * 60)
        })
        .collect();

    let mut slots = Vec::new();

    for &(window_start, window_end) in windows {
        let end = window_end.num_seconds_from_midnight();
        let mut t = window_start.num_seconds_from_midnight();

        while t + step <= end {
            let candidate = (t, t + step);
            let elapsed = floor.map_or(false, |f| t < f);
            let clash = taken
                .iter()
                .any(|&(s, e)| candidate.0 < e && s < candidate.1);

            if !elapsed && !clash {
                if let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt(t, 0) {
                    slots.push(time);
                }
            }

            t += step;
        }
    }

    slots
}

fn intervals_overlap(a: (NaiveTime, i32), b: (NaiveTime, i32)) -> bool {
    let a_start = a.0.num_seconds_from_midnight();
    let a_end = a_start + a.1.max(0) as u32 * 60;
    let b_start = b.0.num_seconds_from_midnight();
    let b_end = b_start + b.1.max(0) as u32 * 60;
    a_start < b_end && b_start < a_end
}
