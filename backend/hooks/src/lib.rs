pub mod builtin;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use builtin::{ActionHook, HookAction, IdentityHook};
pub use pipeline::HookPipeline;
pub use registry::{hook_fn, typed_hook, FnHook, Hook, TypedHook};
pub use types::{HookRegistration, HookSlot, UnknownSlot};
