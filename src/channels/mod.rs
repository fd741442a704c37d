//! Chat transports and the events they exchange with the router.

pub mod channel;
pub mod cli;
pub mod event;
pub mod telegram;

pub use channel::{Channel, EventStream};
pub use cli::CliChannel;
pub use event::{
    Button, CallbackAction, Command, EventKind, InboundEvent, Keyboard, MAX_CALLBACK_ID_BYTES,
    Reply, ReplyMode,
};
pub use telegram::TelegramChannel;
