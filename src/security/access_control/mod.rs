pub mod builtin;
pub mod plugin;
pub mod types;

pub use builtin::AccessControlBuiltin;
pub use plugin::AccessControl;
