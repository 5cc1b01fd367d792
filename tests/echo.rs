//! End-to-end echo server round-trip.

mod util;

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use aioloop::{tcp, HandleId, Loop};

#[test]
fn echo_roundtrip_closes_cleanly() {
    let mut loop_ = util::new_loop();

    let listener = tcp::init(&mut loop_, tcp::Domain::V4).unwrap();
    tcp::bind(&mut loop_, listener, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr: SocketAddr = tcp::local_addr(&loop_, listener).unwrap();

    let client_received = Rc::new(RefCell::new(Vec::new()));
    let client_eof = Rc::new(RefCell::new(false));

    tcp::listen(
        &mut loop_,
        listener,
        128,
        Box::new(move |loop_: &mut Loop, listener_id: HandleId| {
            while let Some(fd) = loop_.stream_accept(listener_id) {
                let conn = tcp::adopt(loop_, fd);
                loop_
                    .stream_read_start(
                        conn,
                        Box::new(|size| vec![0u8; size]),
                        Box::new(move |loop_: &mut Loop, id: HandleId, result| match result {
                            Ok(Some(data)) => {
                                let echoed = data.to_vec();
                                loop_.stream_write(id, echoed, None, None).unwrap();
                            }
                            Ok(None) => {
                                loop_
                                    .stream_shutdown(
                                        id,
                                        Some(Box::new(|loop_: &mut Loop, id: HandleId, _result| {
                                            loop_.close(id, None).unwrap();
                                        })),
                                    )
                                    .unwrap();
                            }
                            Err(_) => {
                                loop_.close(id, None).unwrap();
                            }
                        }),
                    )
                    .unwrap();
            }
            loop_.close(listener_id, None).unwrap();
        }),
    )
    .unwrap();

    let client = tcp::init(&mut loop_, tcp::Domain::V4).unwrap();
    let received_for_read = Rc::clone(&client_received);
    let eof_for_read = Rc::clone(&client_eof);

    tcp::connect(
        &mut loop_,
        client,
        addr,
        Box::new(move |loop_: &mut Loop, id: HandleId, result| {
            result.expect("connect should succeed against our own listener");
            loop_.stream_write(id, b"hello".to_vec(), None, None).unwrap();
            loop_.stream_shutdown(id, None).unwrap();

            let received = Rc::clone(&received_for_read);
            let eof = Rc::clone(&eof_for_read);
            loop_
                .stream_read_start(
                    id,
                    Box::new(|size| vec![0u8; size]),
                    Box::new(move |loop_: &mut Loop, id: HandleId, result| match result {
                        Ok(Some(data)) => received.borrow_mut().extend_from_slice(data),
                        Ok(None) => {
                            *eof.borrow_mut() = true;
                            loop_.close(id, None).unwrap();
                        }
                        Err(_) => loop_.close(id, None).unwrap(),
                    }),
                )
                .unwrap();
        }),
    )
    .unwrap();

    loop_.run().unwrap();

    assert_eq!(&client_received.borrow()[..], b"hello");
    assert!(*client_eof.borrow(), "client should have observed EOF after the server's shutdown");
}
