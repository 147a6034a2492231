pub mod notification;
pub mod record_store;
