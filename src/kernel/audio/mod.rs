pub mod segment;
pub mod segmenter;
