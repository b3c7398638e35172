pub mod mysql_catalog;
pub mod portfolio_api;
pub mod target_service;

pub use mysql_catalog::MySqlCatalog;
pub use portfolio_api::PortfolioApiClient;
pub use target_service::TargetServiceClient;
