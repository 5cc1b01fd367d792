//! Timer ordering across equal and distinct deadlines.

mod util;

use std::cell::RefCell;
use std::rc::Rc;

use aioloop::{HandleId, Loop};

#[test]
fn timers_fire_in_deadline_then_start_sequence_order() {
    let mut loop_ = util::new_loop();

    let order = Rc::new(RefCell::new(Vec::new()));

    let start = |loop_: &mut Loop, label: &'static str, timeout_ms: u64, order: &Rc<RefCell<Vec<&'static str>>>| {
        let id = loop_.timer_init();
        let order = Rc::clone(order);
        loop_
            .timer_start(
                id,
                timeout_ms,
                0,
                Box::new(move |loop_: &mut Loop, id: HandleId| {
                    order.borrow_mut().push(label);
                    loop_.close(id, None).unwrap();
                }),
            )
            .unwrap();
    };

    start(&mut loop_, "A", 10, &order);
    start(&mut loop_, "B", 20, &order);
    start(&mut loop_, "C", 10, &order);

    loop_.run().unwrap();

    assert_eq!(&order.borrow()[..], &["A", "C", "B"]);
}
