pub mod clients;
pub mod database;
pub mod repositories;
pub mod transcode;
pub mod transports;
pub mod webhooks;

pub use clients::*;
pub use database::*;
pub use repositories::*;
pub use transcode::*;
pub use transports::*;
pub use webhooks::*;
