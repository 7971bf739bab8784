pub mod store;
pub mod transient;

pub use store::{BreakpointChange, BreakpointListener, BreakpointStore};
pub use transient::{BreakpointQuery, TransientBreakpoint};
