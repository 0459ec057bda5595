//! Statistics API server with a preload cache

mod app;
mod preload;
mod router;
mod source;
mod warmup;

pub use app::StatServer;
pub use preload::{PreloadCache, PreloadStats};
pub use router::{AppState, create_router};
pub use source::{DataKind, DataSource, Dataset, Entity, FileDataSource};
pub use warmup::{WarmupReport, warm_up};
