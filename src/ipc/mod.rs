//! IPC module for communication with the order/registration UI

mod protocol;
mod server;

pub use protocol::{CaptureStatus, Notification, Request, Response, MAX_MESSAGE_LEN};
pub use server::Server;
