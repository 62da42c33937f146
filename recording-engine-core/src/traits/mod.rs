pub mod capture_provider;
pub mod capture_source;
pub mod device_provider;
pub mod video_backend;
pub mod video_encoder;
