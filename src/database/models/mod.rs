pub mod friendship;
pub mod session;
pub mod user;
