//! DNS resolution via the thread pool.

mod util;

use std::cell::RefCell;
use std::rc::Rc;

use aioloop::{resolver, Loop};

#[test]
fn eight_concurrent_lookups_all_complete() {
    let mut loop_ = util::new_loop();

    const CONCURRENT: usize = 8;
    let completed = Rc::new(RefCell::new(Vec::new()));

    for i in 0..CONCURRENT {
        let completed = Rc::clone(&completed);
        resolver::getaddrinfo(
            &mut loop_,
            "localhost",
            Some(0),
            Box::new(move |_loop_: &mut Loop, result| {
                let addrs = result.expect("resolving localhost should succeed");
                assert!(!addrs.is_empty(), "lookup {i} should resolve to at least one address");
                completed.borrow_mut().push(i);
            }),
        );
    }

    loop_.run().unwrap();

    let mut seen = completed.borrow().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..CONCURRENT).collect::<Vec<_>>(), "every lookup must complete exactly once");
}
