pub mod audio_models;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod frame;
pub mod geometry;
pub mod recording_result;
pub mod source;
pub mod state;
