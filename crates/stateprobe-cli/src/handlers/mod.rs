//! Command handlers - one module per subcommand

pub mod capture;
pub mod compare;
pub mod list;
pub mod prepare;

pub use capture::execute_capture;
pub use compare::execute_compare;
pub use list::execute_list;
pub use prepare::{execute_prepare, prepare_fixture, PrepareRequest, PreparedFixture};
