pub mod appointments;
pub mod attention;
pub mod lifecycle;
pub mod notify;
pub mod payments;
pub mod transitions;

pub use appointments::AppointmentDirectory;
pub use attention::AttentionService;
pub use lifecycle::AppointmentLifecycleService;
pub use notify::NotificationService;
pub use payments::PaymentLedgerService;
pub use transitions::AppointmentStateService;
