pub mod usage_logs;
pub mod users;
