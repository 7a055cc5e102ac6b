pub mod clients;
pub mod entities;
pub mod errors;
pub mod magnet;
pub mod repositories;
pub mod services;
pub mod torrent_file;

pub use clients::*;
pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
