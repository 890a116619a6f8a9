pub mod accounts;
pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod service;
pub mod session;
pub mod slots;
pub mod wal;
pub mod wire;
