pub mod allowlist;

pub use allowlist::{executable_name, AllowlistGuard, DenialReason, DeniedCommand};
