pub mod entry;
pub mod event;
pub mod response;
pub mod router;
