mod control_loop;
mod handle;
mod messages;


pub use control_loop::{Collaborators, ControlLoop};
pub use handle::ControlHandle;
pub use messages::{Command, ControlMessage, ControlSender};
