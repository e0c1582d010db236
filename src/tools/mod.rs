//! Tools: definitions, registry, invocation pipeline and built-ins

pub mod builtin;
pub mod catalog;
pub mod definition;
pub mod invoker;
pub mod throttle;

pub use builtin::{CurrentTime, HttpRequest, builtin_registry};
pub use catalog::{ToolRegistry, ToolSettings};
pub use definition::{DEFAULT_TOOL_TIMEOUT_MS, ExecutionContext, Tool, ToolCapability};
pub use invoker::{InvokeOutcome, ToolInvoker};
pub use throttle::ToolThrottle;
