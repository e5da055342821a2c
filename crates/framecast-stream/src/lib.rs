//! Framecast Stream - frame submission, async sending and the network sink contract
//!
//! [`OutputStream`] is the entry point: the host hands it one float RGBA frame
//! at a time together with the current [`framecast_core::OutputConfig`].

pub mod output;
pub mod pipeline;
pub mod sink;

pub use output::{OutputStream, StreamStats};
pub use pipeline::{AsyncFramePipeline, FrameHandler, PipelineOptions, PipelineStats};
pub use sink::{
    LogSink, NetworkSink, OutgoingFrame, RecordingSink, SenderSettings, SentFrame,
    TIMECODE_SYNTHESIZE,
};
