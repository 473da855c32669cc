mod handler;
mod model;

pub use handler::network;
pub use model::{NetworkNode, NetworkResponse};
