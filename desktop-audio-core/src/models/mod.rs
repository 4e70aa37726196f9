pub mod config;
pub mod error;
pub mod packet;
pub mod record;
pub mod state;
