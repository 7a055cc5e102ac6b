pub mod admin;
pub mod auth;
pub mod servers;
pub mod streams;
pub mod torrents;
pub mod transfers;
pub mod webhooks;
