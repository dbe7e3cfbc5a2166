pub mod builtin;
pub mod plugin;
pub mod types;

pub use builtin::AuthenticationBuiltin;
pub use plugin::Authentication;
