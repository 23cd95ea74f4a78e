pub mod hardware;
pub mod health;
pub mod live;
pub mod live_ws;
