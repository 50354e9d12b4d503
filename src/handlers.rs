pub mod permissions;
pub mod tenancy;
