pub mod api;
pub mod chat;
pub mod reading;
pub mod websocket;
