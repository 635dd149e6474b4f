pub mod checker;
pub mod chunked;
pub mod handshake;
pub mod stream_demux;
