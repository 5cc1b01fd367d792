//! Closing a handle cancels its in-flight connect.

mod util;

use std::cell::RefCell;
use std::rc::Rc;

use aioloop::{tcp, Error, HandleId, Loop};

#[test]
fn closing_mid_connect_cancels_before_close_callback() {
    let mut loop_ = util::new_loop();

    // A bound-but-not-listening socket reserves a port nobody accepts
    // connections on, so the connect this test starts against it never
    // completes on its own and must be canceled by `close`.
    let dead_end = tcp::init(&mut loop_, tcp::Domain::V4).unwrap();
    tcp::bind(&mut loop_, dead_end, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = tcp::local_addr(&loop_, dead_end).unwrap();
    loop_.close(dead_end, None).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));

    let client = tcp::init(&mut loop_, tcp::Domain::V4).unwrap();
    let order_for_connect = Rc::clone(&order);
    tcp::connect(
        &mut loop_,
        client,
        addr,
        Box::new(move |_loop_: &mut Loop, _id: HandleId, result| {
            assert_eq!(result, Err(Error::Canceled));
            order_for_connect.borrow_mut().push("connect");
        }),
    )
    .unwrap();

    let order_for_close = Rc::clone(&order);
    loop_
        .close(
            client,
            Some(Box::new(move |_id: HandleId| {
                order_for_close.borrow_mut().push("close");
            })),
        )
        .unwrap();

    loop_.run().unwrap();

    assert_eq!(&order.borrow()[..], &["connect", "close"]);
}
