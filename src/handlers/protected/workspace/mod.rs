// handlers/protected/workspace/mod.rs - Tenant-scoped endpoints
pub mod current; // GET /api/workspace
pub mod probe; // GET /api/workspace/probe
pub mod reactivate; // POST /api/workspace/reactivate

pub use current::current_get;
pub use probe::probe_get;
pub use reactivate::reactivate_post;
