pub mod audio_mixer;
pub mod clock;
pub mod compositor;
pub mod handoff;
pub mod ring_buffer;
