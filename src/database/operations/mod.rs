pub mod friendship;
pub mod session;
pub mod user;

pub use friendship::FriendshipOperation;
pub use session::SessionOperation;
pub use user::UserOperation;
