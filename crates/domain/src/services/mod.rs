pub mod activity_service;
pub mod auth_service;
pub mod dispatch_service;
pub mod events;
pub mod maintenance_service;
pub mod stream_service;
pub mod transfer_service;

pub use activity_service::*;
pub use auth_service::*;
pub use dispatch_service::*;
pub use events::*;
pub use maintenance_service::*;
pub use stream_service::*;
pub use transfer_service::*;
