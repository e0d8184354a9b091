//! Cross-context delivery through inboxes: ordering, withdrawal, forwarding and
//! senders on other threads.

use ehm::event::{Event, EventType, FAILURE, INTERRUPT};
use ehm::{EhmError, Handler, HandlerFrame, RaiseKind, Runtime};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

static NOTE: EventType = EventType::derived("Note", &INTERRUPT);
static CANCEL: EventType = EventType::derived("Cancel", &FAILURE);

fn recorder() -> (Rc<RefCell<Vec<String>>>, HandlerFrame) {
    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let l = Rc::clone(&log);
    let frame = HandlerFrame::new().with(Handler::new(&NOTE, move |_, e| {
        l.borrow_mut().push(e.message().to_string())
    }));
    (log, frame)
}

#[test]
fn resumes_are_delivered_in_send_order() {
    let rt = Runtime::default();
    let sender = rt.context("sender");
    let target = rt.context("target");
    let (log, frame) = recorder();
    let _handlers = target.install_handlers(frame);

    for text in ["m1", "m2", "m3"] {
        sender.resume_at(Event::new(&NOTE, text), &target.handle());
    }
    assert_eq!(target.handle().pending(), 3);
    assert!(log.borrow().is_empty());

    assert!(target.poll());
    assert_eq!(*log.borrow(), vec!["m1"]);
    assert_eq!(target.poll_all(), 2);
    assert_eq!(*log.borrow(), vec!["m1", "m2", "m3"]);
    assert!(!target.poll());
}

#[test]
fn poll_check_does_not_consume() {
    let rt = Runtime::default();
    let sender = rt.context("sender");
    let target = rt.context("target");
    let (log, frame) = recorder();
    let _handlers = target.install_handlers(frame);

    sender.resume_at(Event::new(&NOTE, "waiting"), &target.handle());
    assert!(target.poll_check());
    assert!(target.poll_check());
    assert_eq!(target.handle().pending(), 1);
    assert!(log.borrow().is_empty());
    target.poll();
    assert!(!target.poll_check());
}

#[test]
fn thrown_message_unwinds_from_poll_point() {
    let rt = Runtime::default();
    let sender = rt.context("canceller");
    let target = rt.context("worker");

    sender.throw_at(Event::new(&CANCEL, "stop now"), &target.handle());
    let reached_end = RefCell::new(false);
    let outcome = target
        .try_block(|| {
            target.poll();
            *reached_end.borrow_mut() = true;
            (String::new(), None)
        })
        .catch(&CANCEL, |e| (e.source_name().to_string(), e.raise_kind()))
        .run();

    assert!(!*reached_end.borrow());
    assert_eq!(outcome, ("canceller".to_string(), Some(RaiseKind::Throw)));
    assert_eq!(target.handle().pending(), 0);
}

#[test]
fn withdrawn_message_is_never_delivered() {
    let rt = Runtime::default();
    let sender = rt.context("sender");
    let target = rt.context("target");
    let handle = target.handle();

    let id = sender.resume_at(Event::new(&NOTE, "retracted"), &handle);
    let event = handle.withdraw(id).unwrap();
    assert_eq!(event.message(), "retracted");
    assert_eq!(handle.pending(), 0);
    assert!(!target.poll());

    assert!(matches!(handle.withdraw(id), Err(EhmError::AlreadyConsumed(m)) if m == id));
}

#[test]
fn withdraw_after_delivery_fails() {
    let rt = Runtime::default();
    let sender = rt.context("sender");
    let target = rt.context("target");
    let (_log, frame) = recorder();
    let _handlers = target.install_handlers(frame);

    let id = sender.resume_at(Event::new(&NOTE, "consumed"), &target.handle());
    assert!(target.poll());
    assert!(target.handle().withdraw(id).is_err());
}

#[test]
fn rethrow_at_forwards_original_stamp() {
    let rt = Runtime::default();
    let origin = rt.context("origin");
    let relay = rt.context("relay");
    let target = rt.context("target");

    let event = origin
        .try_block(|| origin.throw(Event::new(&CANCEL, "forwarded")))
        .catch(&CANCEL, |e| e.clone())
        .run();

    let forwarded = relay
        .try_block(|| relay.throw(event))
        .catch(&CANCEL, |_| relay.rethrow_at(&target.handle()))
        .run();
    assert!(forwarded.is_ok());

    let source = target
        .try_block(|| {
            target.poll();
            String::new()
        })
        .catch(&CANCEL, |e| e.source_name().to_string())
        .run();
    assert_eq!(source, "origin");
    assert!(matches!(
        relay.rethrow_at(&target.handle()),
        Err(EhmError::NoActiveException)
    ));
}

#[test]
fn reresume_at_forwards_the_active_resumption() {
    let rt = Runtime::default();
    let relay = rt.context("relay");
    let target = rt.context("target");
    let target_handle = target.handle();

    let _forward = relay.install_handlers(HandlerFrame::new().with(Handler::new(&NOTE, move |ctx, _| {
        ctx.reresume_at(&target_handle).unwrap();
    })));
    relay.resume(Event::new(&NOTE, "pass it on"));

    let (log, frame) = recorder();
    let _handlers = target.install_handlers(frame);
    assert_eq!(target.poll_all(), 1);
    assert_eq!(*log.borrow(), vec!["pass it on"]);
    assert!(matches!(
        relay.reresume_at(&target.handle()),
        Err(EhmError::NoActiveResumption)
    ));
}

#[test]
fn senders_on_other_threads_keep_per_sender_order() {
    const SENDERS: usize = 4;
    const PER_SENDER: usize = 100;

    let rt = Runtime::default();
    let target = rt.context("hub");
    let handle = target.handle();

    let workers: Vec<_> = (0..SENDERS)
        .map(|n| {
            let rt = rt.clone();
            let handle = handle.clone();
            thread::spawn(move || {
                let sender = rt.context(&format!("sender-{}", n));
                for i in 0..PER_SENDER {
                    sender.resume_at(Event::new(&NOTE, format!("{}:{}", n, i)), &handle);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let (log, frame) = recorder();
    let _handlers = target.install_handlers(frame);
    assert_eq!(target.poll_all(), SENDERS * PER_SENDER);

    let mut next = [0usize; SENDERS];
    for entry in log.borrow().iter() {
        let (n, i) = entry.split_once(':').unwrap();
        let n: usize = n.parse().unwrap();
        let i: usize = i.parse().unwrap();
        assert_eq!(i, next[n], "sender {} delivered out of order", n);
        next[n] += 1;
    }
    assert!(next.iter().all(|&count| count == PER_SENDER));
}
