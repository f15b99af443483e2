// libs/appointment-cell/src/services/notify.rs
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::Appointment;

/// Fire-and-forget dispatch after confirmed/cancelled transitions. Delivery
/// failure is logged and dropped; it must never roll back a transition.
pub struct NotificationService {
    client: Client,
    webhook_url: Option<String>,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            webhook_url: config.notification_webhook_url.clone(),
        }
    }

    pub fn notify_transition(&self, appointment: &Appointment) {
        let Some(url) = self.webhook_url.clone() else {
            debug!("Notification webhook not configured, skipping dispatch");
            return;
        };

        let payload = json!({
            "event": "appointment_status_changed",
            "appointment_id": appointment.id,
            "status": appointment.status,
            "doctor_id": appointment.doctor_id,
            "patient_id": appointment.patient_id,
            "date": appointment.date,
            "time": appointment.time,
        });
        let client = self.client.clone();
        let appointment_id = appointment.id;

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(
                        "Notification for appointment {} answered {}",
                        appointment_id,
                        response.status()
                    );
                }
                Ok(_) => debug!("Notification dispatched for appointment {}", appointment_id),
                Err(e) => warn!("Notification for appointment {} failed: {}", appointment_id, e),
            }
        });
    }
}
