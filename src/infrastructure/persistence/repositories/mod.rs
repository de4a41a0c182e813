mod asset_repository;
mod bar_repository;
mod run_repository;
mod signal_repository;
mod trend_repository;

pub use asset_repository::PgAssetRepository;
pub use bar_repository::PgBarRepository;
pub use run_repository::PgRunRepository;
pub use signal_repository::PgSignalRepository;
pub use trend_repository::PgTrendRepository;
