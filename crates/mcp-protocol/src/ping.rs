//! `ping` — a zero-argument request either side may send at any point after
//! the transport connects, answered with an empty result.

pub mod method {
    pub const PING: &str = "ping";
}
