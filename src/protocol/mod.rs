/// Wire-format types and subject naming for request/response correlation.
mod subjects;
mod wire;

pub use subjects::{broadcast_subject, reply_subject, request_subject};
pub use wire::{CallReply, CallRequest, Fault, FaultKind, ReplyStatus};
