// libs/appointment-cell/src/services/payments.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    AppointmentError, BalancePayment, LedgerView, PaymentLedger, PaymentMethod,
};

/// Deposit and balance bookkeeping for an appointment. The deposit is
/// written once and never amended; balance payments accumulate until the
/// remainder reaches exactly zero, which is what the completion guard reads.
pub struct PaymentLedgerService {
    supabase: Arc<SupabaseClient>,
}

impl PaymentLedgerService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Open the ledger with the deposit. One ledger per appointment: a
    /// second call fails with `DepositAlreadyRecorded`, as does the unique
    /// constraint on the table if two calls race past the read check.
    pub async fn record_deposit(
        &self,
        appointment_id: Uuid,
        total_cents: i64,
        amount_cents: i64,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<PaymentLedger, AppointmentError> {
        if amount_cents <= 0 || amount_cents > total_cents {
            return Err(AppointmentError::ValidationError(format!(
                "Deposit of {} is outside the total of {}",
                amount_cents, total_cents
            )));
        }

        if self.find_ledger(appointment_id).await?.is_some() {
            return Err(AppointmentError::DepositAlreadyRecorded);
        }

        let body = json!({
            "appointment_id": appointment_id,
            "total_cents": total_cents,
            "deposit_cents": amount_cents,
            "deposit_method": method,
            "deposit_paid_at": now,
        });

        let rows: Vec<PaymentLedger> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/payment_ledgers", Some(body))
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AppointmentError::DepositAlreadyRecorded,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let ledger = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Ledger insert returned no row".to_string()))?;

        info!(
            "Deposit of {} recorded for appointment {} ({} total)",
            amount_cents, appointment_id, total_cents
        );
        Ok(ledger)
    }

    /// Record a balance payment. Overpayment is rejected outright; the
    /// caller reconciles manually rather than the ledger absorbing it. When
    /// the remainder reaches exactly zero the ledger is stamped settled.
    pub async fn record_balance_payment(
        &self,
        appointment_id: Uuid,
        amount_cents: i64,
        method: PaymentMethod,
        proof_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerView, AppointmentError> {
        if amount_cents <= 0 {
            return Err(AppointmentError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }

        let ledger = self
            .find_ledger(appointment_id)
            .await?
            .ok_or(AppointmentError::LedgerNotFound)?;
        let payments = self.balance_payments(appointment_id).await?;
        let remaining = ledger.remaining_after(&payments);

        if amount_cents > remaining {
            warn!(
                "Overpayment rejected for appointment {}: {} against remaining {}",
                appointment_id, amount_cents, remaining
            );
            return Err(AppointmentError::OverpaymentRejected {
                attempted_cents: amount_cents,
                remaining_cents: remaining,
            });
        }

        let body = json!({
            "appointment_id": appointment_id,
            "amount_cents": amount_cents,
            "method": method.clone(),
            "proof_ref": proof_ref,
            "paid_at": now,
        });

        let inserted: Vec<BalancePayment> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/balance_payments", Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let payment = inserted
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Payment insert returned no row".to_string()))?;

        let new_remaining = remaining - amount_cents;
        info!(
            "Balance payment of {} recorded for appointment {}, {} remaining",
            amount_cents, appointment_id, new_remaining
        );

        let ledger = if new_remaining == 0 {
            self.mark_settled(appointment_id, &method, now).await?
        } else {
            ledger
        };

        let mut payments = payments;
        payments.push(payment);

        Ok(LedgerView {
            ledger,
            payments,
            remaining_cents: new_remaining,
        })
    }

    /// `total - deposit - sum(balance payments)`; pure read.
    pub async fn remaining_balance(&self, appointment_id: Uuid) -> Result<i64, AppointmentError> {
        let view = self.ledger_view(appointment_id).await?;
        Ok(view.remaining_cents)
    }

    pub async fn deposit_recorded(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        Ok(self.find_ledger(appointment_id).await?.is_some())
    }

    pub async fn ledger_view(&self, appointment_id: Uuid) -> Result<LedgerView, AppointmentError> {
        let ledger = self
            .find_ledger(appointment_id)
            .await?
            .ok_or(AppointmentError::LedgerNotFound)?;
        let payments = self.balance_payments(appointment_id).await?;
        let remaining_cents = ledger.remaining_after(&payments);

        Ok(LedgerView {
            ledger,
            payments,
            remaining_cents,
        })
    }

    /// Ledger if one exists; used by the confirmation guard and the
    /// attention view, where "no ledger yet" is a normal answer.
    pub async fn find_ledger(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<PaymentLedger>, AppointmentError> {
        let path = format!("/rest/v1/payment_ledgers?appointment_id=eq.{}", appointment_id);
        let rows: Vec<PaymentLedger> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn balance_payments(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<BalancePayment>, AppointmentError> {
        let path = format!(
            "/rest/v1/balance_payments?appointment_id=eq.{}&order=paid_at.asc",
            appointment_id
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn mark_settled(
        &self,
        appointment_id: Uuid,
        method: &PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<PaymentLedger, AppointmentError> {
        debug!("Ledger for appointment {} fully settled", appointment_id);

        let path = format!("/rest/v1/payment_ledgers?appointment_id=eq.{}", appointment_id);
        let body = json!({
            "balance_settled_at": now,
            "balance_method": method,
        });

        let rows: Vec<PaymentLedger> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or(AppointmentError::LedgerNotFound)
    }
}
