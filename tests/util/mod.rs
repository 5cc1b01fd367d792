#![allow(dead_code)]

use std::sync::Once;

use aioloop::{Loop, LoopConfig};

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        env_logger::try_init().ok();
    })
}

pub fn new_loop() -> Loop {
    init();
    Loop::new(LoopConfig::default()).expect("unable to create Loop")
}
