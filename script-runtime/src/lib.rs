//! Script-side runtime over the `script-rpc` peer: capability acquisition
//! through the `LoadComponents` handshake, local stub synthesis, and the
//! injection mechanism that binds capabilities to a user script before
//! `system_did_enable` runs.

pub mod capability;
pub mod runtime;
pub mod script;
