pub mod message;
pub mod receiver;
pub mod sender;

pub use message::{TCPReceiverMessage, TCPSenderMessage};
pub use receiver::TCPReceiver;
pub use sender::TCPSender;
