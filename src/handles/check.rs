//! Check watcher: callback runs just after poll (phase 7).

pub type CheckCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId)>;

pub struct CheckState {
    pub cb: Option<CheckCallback>,
}

impl CheckState {
    pub fn new() -> CheckState {
        CheckState { cb: None }
    }
}

impl Default for CheckState {
    fn default() -> Self {
        Self::new()
    }
}
