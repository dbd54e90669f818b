//! Shared pieces of the command line tools.

pub mod backend;
pub mod panel;

pub use backend::{create_device, get_backend_name, init_tracing, SelectedBackend, SelectedDevice};
pub use panel::side_by_side;
