pub use xid::new as new_xid;
pub use xid::Id as Xid;

pub type DateTime = chrono::DateTime<chrono::Utc>;
pub use chrono::Utc;

pub mod config;
pub mod context;
pub mod executor;
pub mod job;
pub mod stats;
pub mod store;
