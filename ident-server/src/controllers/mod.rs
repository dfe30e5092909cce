pub mod identities;
pub mod jwks;
