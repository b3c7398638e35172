mod traits;

pub use traits::{PortfolioClient, RemoteCatalog, TargetSubmitter};
