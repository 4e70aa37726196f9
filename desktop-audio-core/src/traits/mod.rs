pub mod loop_delegate;
pub mod packet_stream;
