//! rota — interval scheduling and conflict prevention for shared clinic
//! resources (doctors and staff).
//!
//! The engine resolves a doctor's free appointment slots from a recurring
//! weekly availability template and admits new allocations (fixed-granularity
//! appointment slots; arbitrary-interval duty shifts) under a non-overlap
//! guarantee that holds across concurrent callers. Admission is atomic:
//! the conflict check, the WAL append and the in-memory apply all happen
//! while holding the resource's write lock.
//!
//! Transport, auth and person-record CRUD live outside this crate. The
//! `api` module carries the request/response shapes the embedding layer
//! exchanges with the engine; the `directory` module is the seam through
//! which display names are resolved.

pub mod api;
pub mod compactor;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
