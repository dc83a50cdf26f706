pub mod file;
pub mod pacer;

pub use file::{AudioFile, BITS_PER_SAMPLE, BYTES_PER_SECOND, CHANNELS, SAMPLE_RATE};
pub use pacer::{AudioPacer, AudioSink, PacingReport};
