/// Bounded circular buffer of interleaved PCM frames.
///
/// Wrap in `Arc<parking_lot::Mutex<RingBuffer>>` for cross-thread access
/// between a capture callback and the mixer.
///
/// Overflow behavior: drops the oldest whole frames, so a stalled mixer
/// never grows memory and never splits a frame across channels.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    channels: usize,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity_frames` frames of `channels` samples.
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let capacity = capacity_frames.max(1) * channels;
        Self {
            buffer: vec![0.0; capacity],
            channels,
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Write interleaved samples. A trailing partial frame is ignored.
    ///
    /// If more frames arrive than fit, only the newest are kept.
    pub fn write(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels;
        if whole == 0 {
            return;
        }
        let samples = &samples[..whole];

        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.available += samples.len();
    }

    /// Read and remove up to `frames` frames; returns interleaved samples.
    pub fn read_frames(&mut self, frames: usize) -> Vec<f32> {
        let to_read = (frames * self.channels).min(self.available);
        if to_read == 0 {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(to_read);
        for i in 0..to_read {
            result.push(self.buffer[(self.read_index + i) % self.capacity]);
        }
        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        result
    }

    /// Frames currently available for reading.
    pub fn frame_count(&self) -> usize {
        self.available / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity / self.channels
    }
}
