mod messages;
mod polling;
mod provider;
pub mod stream;

pub use {
    messages::{FrameError, OutboundMessage, PollResponse, StreamMessage, unwrap_envelope},
    polling::{PollObserver, PollOptions, PollStatus, Poller},
    provider::{ExecutionLauncher, HttpBackend, LaunchReceipt, StatusSource},
    stream::{LinkState, LinkStatus, SessionOptions, StreamChannel, StreamError, StreamHandler},
};
