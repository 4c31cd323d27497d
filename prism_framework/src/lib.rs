/*!
# Prism Framework

Core services for the Prism real-time rendering framework.

This crate provides the platform-agnostic pieces shared by every GPU backend:
the error taxonomy, the logging system, and the framework singleton that owns
cross-cutting services. The actual device/resource-lifecycle management lives
in backend crates such as `prism_framework_backend_vulkan`.

## Architecture

- **Error / Result**: one error enum covering initialization, resource
  creation, submission, and swapchain-staleness failures
- **Logger**: pluggable logging trait with a colored console default
- **Framework**: process-wide singleton holding the installed logger
*/

// Internal modules
mod error;
mod engine;
pub mod log;

// Main prism namespace module
pub mod prism {
    // Error types
    pub use crate::error::{PrismError as Error, PrismResult as Result};

    // Framework singleton
    pub use crate::engine::Framework;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        // Note: prism_* macros are exported at the crate root by #[macro_export]
    }
}

// Convenience re-exports at the crate root
pub use error::{PrismError, PrismResult};
pub use engine::Framework;
