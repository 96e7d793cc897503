//! Id generation for signals, events and dispatch attempts.

/// Generate a new opaque id (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
