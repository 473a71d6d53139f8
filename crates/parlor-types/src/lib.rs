/// Types shared between the storage layer's callers and the HTTP surface:
/// form payloads, the JSON refresh payload and the view models rendered
/// into templates.
pub mod api;
pub mod models;
