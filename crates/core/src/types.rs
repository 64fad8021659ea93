/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Stable annotation identifier owned by the store (survives sessions).
pub type AnnotationId = String;

/// Identifier the rendering engine assigns to its own objects. Only stable
/// within one render session.
pub type ExternalId = String;

/// Identifier of a rendering viewport.
pub type ViewportId = String;

/// Generate a fresh random identifier for store-owned records.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
