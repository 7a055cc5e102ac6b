pub mod factory;
pub mod rtorrent;
pub mod transmission;
pub mod xmlrpc;

pub use factory::*;
pub use rtorrent::*;
pub use transmission::*;
