mod device;
mod guard;

pub use device::{
    restore_terminal, CrosstermDevice, CrosstermEvents, EventSource, NullDevice, TerminalDevice,
};
pub use guard::{is_cancel_event, GuardState, InputGuard};
