//! RTMP relay - follows an RTMP server log and republishes each live stream
//! over RTSP with an ffmpeg stream copy.

pub mod config;
pub mod controller;
pub mod events;
pub mod feed;
pub mod relay;
pub mod transcoder;
