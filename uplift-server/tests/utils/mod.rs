pub mod relay_helpers;

pub use mock_sink::*;
pub use relay_helpers::*;
pub use test_server::*;
