//! Cross-core messaging: typed messages, the text codec, the SPSC mailbox
//! and the transport bridge channels.

pub mod channels;
pub mod codec;
pub mod mailbox;
pub mod queue;
