// libs/appointment-cell/tests/transitions_test.rs
//
// State machine against a mocked PostgREST backend: table checks, the
// per-target guards, the conditional status write and the history append.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentStatus};
use appointment_cell::services::appointments::AppointmentDirectory;
use appointment_cell::services::notify::NotificationService;
use appointment_cell::services::payments::PaymentLedgerService;
use appointment_cell::services::transitions::AppointmentStateService;
use scheduling_cell::services::availability::AvailabilityService;
use scheduling_cell::services::holds::SlotHoldService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

struct TestSetup {
    transitions: AppointmentStateService,
    mock_server: MockServer,
    appointment_id: Uuid,
    actor: Uuid,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;

        let config = AppConfig {
            supabase_url: mock_server.uri(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: None,
            supabase_jwt_secret: "test-secret".to_string(),
            notification_webhook_url: None,
        };
        let supabase = Arc::new(SupabaseClient::new(&config));
        let holds = Arc::new(SlotHoldService::new(Arc::clone(&supabase)));
        let availability = Arc::new(AvailabilityService::new(
            Arc::clone(&supabase),
            Arc::clone(&holds),
        ));
        let directory = Arc::new(AppointmentDirectory::new(
            Arc::clone(&supabase),
            holds,
            availability,
        ));
        let payments = Arc::new(PaymentLedgerService::new(Arc::clone(&supabase)));
        let notifier = Arc::new(NotificationService::new(&config));

        Self {
            transitions: AppointmentStateService::new(supabase, directory, payments, notifier),
            mock_server,
            appointment_id: Uuid::new_v4(),
            actor: Uuid::new_v4(),
        }
    }

    fn appointment_json(&self, status: &str) -> serde_json::Value {
        json!({
            "id": self.appointment_id,
            "patient_id": Uuid::new_v4(),
            "doctor_id": Uuid::new_v4(),
            "service_id": Uuid::new_v4(),
            "date": "2030-06-01",
            "time": "10:00:00",
            "duration_minutes": 30,
            "status": status,
            "booker_name": "Dana Reyes",
            "booker_phone": "+15550100",
            "booker_email": null,
            "consent_ref": null,
            "created_at": "2030-05-01T12:00:00Z"
        })
    }

    async fn mock_current_status(&self, status: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", self.appointment_id)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![self.appointment_json(status)]),
            )
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_status_patch(&self, from: &str, to: &str) {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", self.appointment_id)))
            .and(query_param("status", format!("eq.{}", from)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![self.appointment_json(to)]),
            )
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_history_append(&self) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointment_state_history"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_ledger(&self, rows: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/payment_ledgers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_balance_payments(&self, rows: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/balance_payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    fn ledger_json(&self, total: i64, deposit: i64) -> serde_json::Value {
        json!({
            "appointment_id": self.appointment_id,
            "total_cents": total,
            "deposit_cents": deposit,
            "deposit_method": "bank_transfer",
            "deposit_paid_at": "2030-05-01T12:30:00Z",
            "balance_settled_at": null,
            "balance_method": null
        })
    }

    fn payment_json(&self, amount: i64) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": self.appointment_id,
            "amount_cents": amount,
            "method": "cash",
            "proof_ref": null,
            "paid_at": "2030-06-01T10:40:00Z"
        })
    }
}

fn before_appointment_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 30, 9, 0, 0).unwrap()
}

fn on_appointment_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 9, 55, 0).unwrap()
}

#[tokio::test]
async fn pending_confirms_once_deposit_is_recorded() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("pending").await;
    setup.mock_ledger(vec![setup.ledger_json(100_000, 50_000)]).await;
    setup.mock_status_patch("pending", "confirmed").await;
    setup.mock_history_append().await;

    let updated = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Confirmed,
            setup.actor,
            None,
            before_appointment_day(),
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn confirmation_without_deposit_is_rejected() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("pending").await;
    setup.mock_ledger(vec![]).await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Confirmed,
            setup.actor,
            None,
            before_appointment_day(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::DepositRequired));
}

#[tokio::test]
async fn pending_cannot_skip_to_in_progress() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("pending").await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::InProgress,
            setup.actor,
            None,
            on_appointment_day(),
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::InProgress
        })
    );
}

#[tokio::test]
async fn terminal_status_permits_no_transitions() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("completed").await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Cancelled,
            setup.actor,
            Some("staff override attempt".to_string()),
            on_appointment_day(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidTransition { .. }));
}

#[tokio::test]
async fn consult_start_requires_same_day() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("confirmed").await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::InProgress,
            setup.actor,
            None,
            before_appointment_day(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::NotSameDay));
}

#[tokio::test]
async fn consult_starts_on_the_appointment_day() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("confirmed").await;
    setup.mock_status_patch("confirmed", "in_progress").await;
    setup.mock_history_append().await;

    let updated = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::InProgress,
            setup.actor,
            None,
            on_appointment_day(),
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::InProgress);
}

#[tokio::test]
async fn completion_with_outstanding_balance_is_rejected() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("in_progress").await;
    setup.mock_ledger(vec![setup.ledger_json(100_000, 50_000)]).await;
    setup.mock_balance_payments(vec![]).await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Completed,
            setup.actor,
            None,
            on_appointment_day(),
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::BalanceNotSettled {
            remaining_cents: 50_000
        })
    );
}

#[tokio::test]
async fn completion_succeeds_once_balance_is_exactly_zero() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("in_progress").await;
    setup.mock_ledger(vec![setup.ledger_json(100_000, 50_000)]).await;
    setup
        .mock_balance_payments(vec![setup.payment_json(50_000)])
        .await;
    setup.mock_status_patch("in_progress", "completed").await;
    setup.mock_history_append().await;

    let updated = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Completed,
            setup.actor,
            None,
            on_appointment_day(),
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn concurrent_writer_surfaces_as_stale_status() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("pending").await;
    setup.mock_ledger(vec![setup.ledger_json(100_000, 50_000)]).await;
    // The conditional PATCH matches nothing: someone else already moved the
    // row.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Confirmed,
            setup.actor,
            None,
            before_appointment_day(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::StaleStatus));
}

#[tokio::test]
async fn transition_writes_exactly_one_history_row() {
    let setup = TestSetup::new().await;
    setup.mock_current_status("pending").await;
    setup.mock_ledger(vec![setup.ledger_json(100_000, 50_000)]).await;
    setup.mock_status_patch("pending", "confirmed").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_state_history"))
        .and(body_partial_json(json!({
            "appointment_id": setup.appointment_id,
            "previous_status": "pending",
            "new_status": "confirmed",
            "changed_by": setup.actor
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    setup
        .transitions
        .change_status(
            setup.appointment_id,
            AppointmentStatus::Confirmed,
            setup.actor,
            None,
            before_appointment_day(),
        )
        .await
        .unwrap();
}
