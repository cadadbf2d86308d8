pub mod audit_repo;
pub mod booking_repo;
pub mod lock;
pub mod payment_repo;
pub mod webhook_repo;
