pub mod blocking;
pub mod handlers;
pub mod models;
pub mod reporting;

pub use blocking::{pair_is_blocked, BlockService};
pub use reporting::ReportService;
