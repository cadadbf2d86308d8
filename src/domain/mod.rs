pub mod audit;
pub mod booking;
pub mod error;
pub mod gateway;
pub mod money;
pub mod payment;
pub mod ports;
pub mod validate;
pub mod webhook;
