pub mod container;
pub(crate) mod pipeline;
pub mod rate_control;
pub mod reader;
pub mod resources;
pub mod software;
