pub mod session;
pub mod tenant;
pub mod token;
