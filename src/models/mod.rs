pub mod api;
pub mod job;
pub mod settings;
pub mod status;
