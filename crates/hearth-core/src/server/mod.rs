//! Kernel side of the wire: the accept loop and the request dispatcher.

pub mod dispatcher;
pub mod listener;

pub use dispatcher::Dispatcher;
pub use listener::KernelListener;
