pub mod events;
pub mod instamojo;
pub mod memory;
pub mod payments;
pub mod repository;
pub mod store;
