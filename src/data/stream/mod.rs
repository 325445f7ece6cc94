mod channel;
mod session;

pub use {
    channel::{LinkStatus, StreamChannel, StreamHandler},
    session::{
        ConnectionId, LinkAction, LinkState, SessionOptions, StreamError, StreamSession,
    },
};
