//! Idle watcher: callback runs every iteration while the loop has any
//! other active work (phase 4).

pub type IdleCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId)>;

pub struct IdleState {
    pub cb: Option<IdleCallback>,
}

impl IdleState {
    pub fn new() -> IdleState {
        IdleState { cb: None }
    }
}

impl Default for IdleState {
    fn default() -> Self {
        Self::new()
    }
}
