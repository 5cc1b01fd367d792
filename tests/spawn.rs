//! Spawning a child process and talking to it over its stdio pipes.

mod util;

use std::cell::RefCell;
use std::rc::Rc;

use aioloop::{process, HandleId, Loop};
use process::Stdio;

#[test]
fn cat_echoes_stdin_to_stdout_and_exits_cleanly() {
    let mut loop_ = util::new_loop();

    let stdout_bytes = Rc::new(RefCell::new(Vec::new()));
    let exit_info = Rc::new(RefCell::new(None));

    let exit_info_for_cb = Rc::clone(&exit_info);
    let (proc_id, stdio) = process::spawn(
        &mut loop_,
        "/usr/bin/cat",
        &[],
        vec![
            Stdio::PipeCreate { readable: false, writable: true },
            Stdio::PipeCreate { readable: true, writable: false },
            Stdio::Inherit,
        ],
        Box::new(move |loop_: &mut Loop, id: HandleId, exit_status, term_signal| {
            *exit_info_for_cb.borrow_mut() = Some((exit_status, term_signal));
            loop_.close(id, None).unwrap();
        }),
    )
    .expect("spawning /usr/bin/cat should succeed");

    let stdin_id = stdio[0].expect("stdin pipe handle");
    let stdout_id = stdio[1].expect("stdout pipe handle");
    assert!(stdio[2].is_none(), "an Inherit slot creates no stream handle");

    loop_.stream_write(stdin_id, b"ping\n".to_vec(), None, None).unwrap();
    loop_
        .stream_shutdown(
            stdin_id,
            Some(Box::new(|loop_: &mut Loop, id: HandleId, result| {
                result.unwrap();
                loop_.close(id, None).unwrap();
            })),
        )
        .unwrap();

    let stdout_bytes_for_read = Rc::clone(&stdout_bytes);
    loop_
        .stream_read_start(
            stdout_id,
            Box::new(|size| vec![0u8; size]),
            Box::new(move |loop_: &mut Loop, id: HandleId, result| match result {
                Ok(Some(data)) => stdout_bytes_for_read.borrow_mut().extend_from_slice(data),
                Ok(None) => loop_.close(id, None).unwrap(),
                Err(_) => loop_.close(id, None).unwrap(),
            }),
        )
        .unwrap();

    loop_.run().unwrap();

    assert_eq!(&stdout_bytes.borrow()[..], b"ping\n");
    assert_eq!(*exit_info.borrow(), Some((0, 0)));
    let _ = proc_id;
}
