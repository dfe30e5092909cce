mod key;
mod user;

pub use key::KeyImpl;
pub use user::UserImpl;
