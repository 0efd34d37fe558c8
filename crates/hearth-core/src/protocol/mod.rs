//! Wire protocol between callers and the kernel.
//!
//! One connection carries exactly one exchange:
//!
//! ```text
//! caller -> kernel:  <UTF-8 JSON request document>\n__END__\n
//! kernel -> caller:  <UTF-8 JSON response document>   (then close)
//! ```
//!
//! The sentinel is the only request framing the kernel accepts. Responses
//! carry no sentinel; callers read until EOF or until the accumulated bytes
//! parse as a complete document.

pub mod framing;
pub mod message;

pub use framing::{
    decode_request, decode_response, read_request_frame, write_request, write_response,
    ResponseAccumulator,
};
pub use message::{
    Action, ErrorResult, ExecuteResult, InspectResult, Request, ResetResult, Response,
    StatusResult, VariableInfo,
};
