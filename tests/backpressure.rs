//! Backpressure on a pipe nobody reads.

mod util;

use std::cell::RefCell;
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::thread;

use aioloop::pipe;

const CHUNK: usize = 64 * 1024;
const CHUNKS: usize = 1024; // 64 MiB total

fn set_nonblocking(fd: i32) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

#[test]
fn write_queue_grows_then_drains_in_submission_order() {
    let mut loop_ = util::new_loop();

    let (writer, peer) = UnixStream::pair().unwrap();
    set_nonblocking(writer.as_raw_fd());
    let writer_fd: OwnedFd = writer.into();
    let pipe_id = pipe::adopt(&mut loop_, writer_fd, false);

    let order = Rc::new(RefCell::new(Vec::new()));
    let mut sizes = Vec::with_capacity(CHUNKS);

    for i in 0..CHUNKS {
        let order = Rc::clone(&order);
        let is_last = i + 1 == CHUNKS;
        loop_
            .stream_write(
                pipe_id,
                vec![0xABu8; CHUNK],
                None,
                Some(Box::new(move |loop_, id, result| {
                    result.expect("queued write should eventually succeed once the peer drains it");
                    order.borrow_mut().push(i);
                    if is_last {
                        loop_.close(id, None).unwrap();
                    }
                })),
            )
            .unwrap();
        sizes.push(loop_.write_queue_size(pipe_id));
    }

    assert!(sizes.windows(2).all(|w| w[1] >= w[0]), "queue size must grow monotonically: {sizes:?}");
    assert!(sizes.last().copied().unwrap_or(0) > 0, "a peer that never reads must leave bytes queued");
    assert!(order.borrow().is_empty(), "no write callback should fire before the peer starts reading");

    let total_bytes = CHUNK * CHUNKS;
    let reader = thread::spawn(move || {
        let mut peer = peer;
        let mut buf = vec![0u8; CHUNK];
        let mut read_total = 0usize;
        while read_total < total_bytes {
            let n = peer.read(&mut buf).expect("reading the drained side should not fail");
            if n == 0 {
                break;
            }
            read_total += n;
        }
        read_total
    });

    loop_.run().unwrap();
    let read_total = reader.join().unwrap();

    assert_eq!(read_total, total_bytes);
    assert_eq!(&order.borrow()[..], &(0..CHUNKS).collect::<Vec<_>>()[..]);
}
