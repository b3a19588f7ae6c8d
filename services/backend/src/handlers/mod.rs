pub mod crash;
pub mod health;
pub mod markets;
pub mod ws;
