//! Resumption handler search: ordering, consequential search, nesting and
//! default-resume escalation.

use super::test_utils::{expect_fallback, trapping_runtime};
use ehm::config::{EhmConfig, EngineConfig};
use ehm::event::{Event, EventType, Resolution, FAILURE, INTERRUPT};
use ehm::{BindingToken, Context, Handler, HandlerFrame, RaiseKind, Runtime, Violation};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static WAKE: EventType = EventType::derived("Wake", &INTERRUPT);
static RELOAD: EventType = EventType::derived("Reload", &INTERRUPT);

static DEFAULTED: AtomicUsize = AtomicUsize::new(0);

fn count_default(_: &Context, _: &Event) -> Resolution {
    DEFAULTED.fetch_add(1, Ordering::SeqCst);
    Resolution::Handled
}

fn decline(_: &Context, _: &Event) -> Resolution {
    Resolution::Unhandled
}

static SELF_HANDLED: EventType =
    EventType::derived("SelfHandled", &INTERRUPT).with_default_resume(count_default);
static SELF_HANDLED_CHILD: EventType = EventType::derived("SelfHandledChild", &SELF_HANDLED);
static DECLINED: EventType = EventType::derived("Declined", &INTERRUPT).with_default_resume(decline);

static RETRIED: AtomicUsize = AtomicUsize::new(0);

fn retry(ctx: &Context, _: &Event) -> Resolution {
    RETRIED.fetch_add(1, Ordering::SeqCst);
    ctx.reresume(true).unwrap();
    Resolution::Handled
}

fn patch_and_retry(ctx: &Context, _: &Event) -> Resolution {
    let patched = Rc::new(Cell::new(0));
    let p = Rc::clone(&patched);
    let frame = HandlerFrame::new().with(Handler::new(&PATCHED, move |_, _| p.set(p.get() + 1)));
    ctx.with_handlers(frame, || ctx.reresume(true).unwrap());
    if patched.get() == 1 {
        Resolution::Handled
    } else {
        Resolution::Unhandled
    }
}

static RETRY: EventType = EventType::derived("Retry", &INTERRUPT).with_default_resume(retry);
static PATCHED: EventType =
    EventType::derived("Patched", &INTERRUPT).with_default_resume(patch_and_retry);

type Log = Rc<RefCell<Vec<String>>>;

fn logging_handler(log: &Log, ty: &'static EventType, tag: &str) -> Handler {
    let log = Rc::clone(log);
    let tag = tag.to_string();
    Handler::new(ty, move |_, e| {
        log.borrow_mut().push(format!("{}:{}", tag, e.message()))
    })
}

#[test]
fn consequential_resume_notifies_each_matching_frame_once() {
    let rt = Runtime::default();
    let ctx = rt.context("conseq");
    let log: Log = Rc::default();

    let _f0 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "f0")));
    let _f1 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &RELOAD, "f1")));
    let _f2 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &INTERRUPT, "f2")));

    ctx.resume(Event::new(&WAKE, "w"));
    assert_eq!(*log.borrow(), vec!["f2:w", "f0:w"]);
}

#[test]
fn handler_re_resuming_its_own_type_terminates() {
    let rt = Runtime::default();
    let ctx = rt.context("loop");
    let log: Log = Rc::default();

    let _outer = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "outer")));
    let inner_log = Rc::clone(&log);
    let _inner = ctx.install_handlers(HandlerFrame::new().with(Handler::new(&WAKE, move |ctx, e| {
        inner_log.borrow_mut().push(format!("inner:{}", e.message()));
        ctx.resume_with(Event::new(&WAKE, "again"), None, true);
    })));

    ctx.resume_with(Event::new(&WAKE, "first"), None, true);
    assert_eq!(
        *log.borrow(),
        vec!["inner:first", "outer:again", "outer:first"]
    );
}

#[test]
fn nested_resumptions_at_different_depths_search_independently() {
    let rt = Runtime::default();
    let ctx = rt.context("depths");
    let log: Log = Rc::default();

    let _f0 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "f0")));
    let nested_log = Rc::clone(&log);
    let _f1 = ctx.install_handlers(HandlerFrame::new().with(Handler::new(&RELOAD, move |ctx, _| {
        let _fresh = ctx.install_handlers(
            HandlerFrame::new().with(logging_handler(&nested_log, &WAKE, "fresh")),
        );
        ctx.resume_with(Event::new(&WAKE, "from-handler"), None, true);
    })));
    let _f2 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "f2")));

    ctx.resume(Event::new(&RELOAD, "r"));
    assert_eq!(*log.borrow(), vec!["fresh:from-handler", "f0:from-handler"]);

    log.borrow_mut().clear();
    ctx.resume(Event::new(&WAKE, "top"));
    assert_eq!(*log.borrow(), vec!["f2:top", "f0:top"]);
}

#[test]
fn reresume_keeps_original_stamp() {
    let rt = Runtime::default();
    let ctx = rt.context("origin");
    let other = rt.context("bystander");
    let log: Log = Rc::default();

    let outer_log = Rc::clone(&log);
    let _outer = ctx.install_handlers(HandlerFrame::new().with(Handler::new(&WAKE, move |ctx, e| {
        outer_log
            .borrow_mut()
            .push(format!("{}:{:?}", e.source_name(), e.raise_kind()));
        assert_eq!(ctx.current_event_name(RaiseKind::Resume), Some("Wake"));
    })));
    let _inner = ctx.install_handlers(
        HandlerFrame::new().with(Handler::new(&WAKE, |ctx, _| ctx.reresume(false).unwrap())),
    );

    ctx.resume_with(Event::new(&WAKE, "x"), None, false);
    assert_eq!(*log.borrow(), vec!["origin:Some(Resume)"]);
    assert!(other.current_resumption().is_none());
}

#[test]
fn bound_handlers_only_see_their_binding() {
    let rt = Runtime::default();
    let ctx = rt.context("bound");
    let log: Log = Rc::default();
    let token = BindingToken::next();

    let bound_log = Rc::clone(&log);
    let _outer = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "unbound")));
    let _inner = ctx.install_handlers(HandlerFrame::new().with(Handler::bound(token, &WAKE, move |_, e| {
        bound_log.borrow_mut().push(format!("bound:{}", e.message()))
    })));

    ctx.resume_with(Event::new(&WAKE, "plain"), None, false);
    ctx.resume_with(Event::new(&WAKE, "tagged"), Some(token), false);
    assert_eq!(*log.borrow(), vec!["unbound:plain", "bound:tagged"]);
}

#[test]
fn default_resume_is_inherited_and_handles() {
    let rt = Runtime::default();
    let ctx = rt.context("defaults");
    let before = DEFAULTED.load(Ordering::SeqCst);

    ctx.resume(Event::new(&SELF_HANDLED, "a"));
    ctx.resume(Event::new(&SELF_HANDLED_CHILD, "b"));
    assert_eq!(DEFAULTED.load(Ordering::SeqCst) - before, 2);
}

#[test]
fn declined_default_escalates_to_unexpected() {
    let rt = trapping_runtime();
    let ctx = rt.context("declined");

    let report = expect_fallback(|| ctx.resume(Event::new(&DECLINED, "not mine")));
    assert_eq!(report.violation, Violation::UnmatchedResume);
    assert_eq!(report.event_type, "Declined");
    assert_eq!(report.source, "declined");
    assert_eq!(report.message, "not mine");
    assert!(ctx.current_resumption().is_none());
}

#[test]
fn default_resume_reresuming_its_event_escalates_once() {
    let rt = trapping_runtime();
    let ctx = rt.context("retrier");

    let report = expect_fallback(|| ctx.resume(Event::new(&RETRY, "again?")));
    assert_eq!(RETRIED.load(Ordering::SeqCst), 1);
    assert_eq!(report.violation, Violation::UnmatchedResume);
    assert_eq!(report.event_type, "Retry");
    assert!(ctx.current_resumption().is_none());

    // The guard is released once the escalation has unwound.
    let report = expect_fallback(|| ctx.resume(Event::new(&RETRY, "once more")));
    assert_eq!(RETRIED.load(Ordering::SeqCst), 2);
    assert_eq!(report.message, "once more");
}

#[test]
fn default_resume_reresume_reaches_frames_it_installs() {
    let rt = trapping_runtime();
    let ctx = rt.context("patcher");
    ctx.resume(Event::new(&PATCHED, "p"));
    assert!(ctx.current_resumption().is_none());
}

#[test]
fn throw_from_handler_unwinds_past_raise_point() {
    let rt = Runtime::default();
    let ctx = rt.context("escalating");
    let log: Log = Rc::default();

    let _outer = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "outer")));
    let caught = ctx
        .try_block(|| {
            ctx.resume(Event::new(&WAKE, "w"));
            "returned".to_string()
        })
        .handler(Handler::new(&WAKE, |ctx, e| {
            ctx.throw(Event::new(&FAILURE, format!("escalated {}", e.message())))
        }))
        .catch(&FAILURE, |e| e.message().to_string())
        .run();
    assert_eq!(caught, "escalated w");

    // The try block's frame is gone and the search start is restored.
    ctx.resume(Event::new(&WAKE, "after"));
    assert_eq!(*log.borrow(), vec!["outer:after"]);
    assert!(ctx.current_resumption().is_none());
}

#[test]
fn configured_default_conseq_applies_to_resume() {
    let config = EhmConfig {
        engine: EngineConfig {
            default_conseq: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let rt = Runtime::from_config(&config).unwrap();
    let ctx = rt.context("single");
    let log: Log = Rc::default();

    let _f0 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "f0")));
    let _f1 = ctx.install_handlers(HandlerFrame::new().with(logging_handler(&log, &WAKE, "f1")));

    ctx.resume(Event::new(&WAKE, "w"));
    assert_eq!(*log.borrow(), vec!["f1:w"]);
}
