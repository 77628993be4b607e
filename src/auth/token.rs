//! Token secrets and the per-user token record.

pub mod record;
pub mod secret;
