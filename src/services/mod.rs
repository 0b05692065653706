pub mod metrics;
pub mod number_source;
pub mod quota_manager;

pub use metrics::*;
pub use number_source::*;
pub use quota_manager::*;
