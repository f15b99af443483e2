pub mod availability;
pub mod holds;

pub use availability::AvailabilityService;
pub use holds::SlotHoldService;
