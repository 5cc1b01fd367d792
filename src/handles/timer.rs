//! Timer handle: a thin wrapper driving `crate::time::Timers` and surfacing
//! its due entries to the loop's timer phase.

pub type TimerCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId)>;

pub struct TimerHandleState {
    pub cb: Option<TimerCallback>,
}

impl TimerHandleState {
    pub fn new() -> TimerHandleState {
        TimerHandleState { cb: None }
    }
}

impl Default for TimerHandleState {
    fn default() -> Self {
        Self::new()
    }
}
