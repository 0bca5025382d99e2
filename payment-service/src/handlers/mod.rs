pub mod configurations;
pub mod payment_requests;
pub mod payments;
pub mod webhook;
