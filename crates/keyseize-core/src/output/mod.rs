// Keyseize Output Layer
// Transport sinks for decoded key events

mod pipe;

pub use pipe::{
    encode_record, ChannelSink, KeySink, OutputFormat, PipeSink, TextSink, TransportError,
    RECORD_LEN,
};
