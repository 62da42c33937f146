pub mod metadata;
pub mod sink;
pub mod still;
