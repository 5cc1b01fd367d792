//! Signal handle ("Signal: registers interest in a signal
//! number"). Grounded on mio's signal-pipe pattern: rather than running
//! arbitrary code in a signal handler, the handler only writes the signal
//! number to a self-pipe the loop already watches, and dispatch happens on
//! the loop thread during the pending-callbacks phase.

pub type SignalCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId, i32)>;

pub struct SignalState {
    pub signum: i32,
    pub cb: Option<SignalCallback>,
}

impl SignalState {
    pub fn new(signum: i32) -> SignalState {
        SignalState { signum, cb: None }
    }
}
