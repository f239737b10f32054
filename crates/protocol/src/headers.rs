//! Header names used on the wire

pub const TXN_ID: &str = "txn_id";
pub const OWNER_CONTEXT: &str = "owner_context";
pub const TIMEOUT_MS: &str = "timeout_ms";
pub const DURABILITY: &str = "durability";
pub const KIND: &str = "kind";
pub const OBJECT_NAME: &str = "object_name";
pub const STATUS: &str = "status";
pub const ERROR: &str = "error";
