pub mod asset_status;
pub mod dashboard;
pub mod geocoding;
pub mod notifications;
pub mod receipt;
pub mod scheduler;
pub mod thai_text;
