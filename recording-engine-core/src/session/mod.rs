pub mod events;
pub mod manager;
pub mod recorder;
pub(crate) mod run;
pub(crate) mod snapshot;
pub(crate) mod workers;
