pub mod bridge;
pub mod handler;
pub mod keys;
pub mod pty;
pub mod session;
