pub mod identities;
pub mod key;
pub mod session;
pub mod setup;
pub mod token;
