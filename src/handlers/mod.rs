// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (bearer token). What each route needs from
// the pipeline is declared in `middleware::routes`, not here.
pub mod protected;
pub mod public;
