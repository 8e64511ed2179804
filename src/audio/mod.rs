pub mod builder;
pub mod decoder;
pub mod segment;

pub use builder::SegmentBuilder;
pub use decoder::{DecodedAudio, Decoder, SampleBuffer, WavDecoder};
pub use segment::{AudioSegment, SegmentSource};
