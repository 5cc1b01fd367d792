//! Prepare watcher: callback runs just before blocking (phase 5).

pub type PrepareCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId)>;

pub struct PrepareState {
    pub cb: Option<PrepareCallback>,
}

impl PrepareState {
    pub fn new() -> PrepareState {
        PrepareState { cb: None }
    }
}

impl Default for PrepareState {
    fn default() -> Self {
        Self::new()
    }
}
