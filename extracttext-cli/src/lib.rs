// All extraction functionality is in extracttext-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod tool_check;

// Re-export core types for convenience
pub use extracttext_core::*;

// Re-export CLI utilities
pub use tool_check::{default_store_dir, ToolCheck, ToolStatus};
