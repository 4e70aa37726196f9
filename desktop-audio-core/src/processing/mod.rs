pub mod compressor;
pub mod extractor;
pub mod frame_reader;
