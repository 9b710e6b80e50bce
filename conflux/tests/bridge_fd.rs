mod common;

use common::{Calls, RecordingHost};
use conflux::{Error, EventMask, Handler, Readiness};

use std::rc::Rc;

fn recording_handler(calls: &Rc<Calls>, name: &'static str, fd: i32, mask: EventMask) -> Rc<Handler> {
    let calls = calls.clone();
    Handler::new(fd, mask, move |h| calls.push(name, h.revents()))
}

fn live_entries<H: conflux::HostLoop + 'static>(inner: &conflux::BridgedLoop<H>) -> usize {
    inner.state().map(|s| s.len()).unwrap_or(0)
}

#[test]
fn test_add_then_del_leaves_nothing_behind() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 3, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");

    assert!(handler.backend_data().is_some());
    assert_eq!(host.len(), 1);
    assert_eq!(live_entries(&inner), 1);

    inner.stop_fd(&handler).expect("Failed to stop handler");

    assert!(handler.backend_data().is_none());
    assert_eq!(host.len(), 0);
    assert_eq!(host.removed.borrow().len(), 1);
    assert_eq!(live_entries(&inner), 0);
}

#[test]
fn test_registration_uses_translated_mask() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 5, EventMask::READ | EventMask::PRI);
    inner.start_fd(&handler).expect("Failed to start handler");

    assert_eq!(host.mask_of(5), Some(Readiness::READABLE));
}

#[test]
fn test_mod_updates_mask_in_place() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 4, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");
    let slot = handler.backend_data();

    let new_mask = EventMask::READ | EventMask::WRITE;
    inner
        .set_event_mask(&handler, new_mask)
        .expect("Failed to update mask");

    assert_eq!(host.mask_of(4), Some(conflux::mask::to_host(new_mask)));
    assert_eq!(host.updates.get(), 1);
    assert_eq!(host.len(), 1);
    assert!(host.removed.borrow().is_empty());
    assert_eq!(handler.backend_data(), slot);
    assert_eq!(live_entries(&inner), 1);
}

#[test]
fn test_mask_change_before_start_does_not_touch_host() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 4, EventMask::READ);
    inner
        .set_event_mask(&handler, EventMask::WRITE)
        .expect("Failed to update mask");

    assert_eq!(host.updates.get(), 0);

    inner.start_fd(&handler).expect("Failed to start handler");
    assert_eq!(host.mask_of(4), Some(Readiness::WRITABLE));
}

#[test]
fn test_relay_emits_on_one_watcher_and_dispatches_once() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let a = recording_handler(&calls, "a", 10, EventMask::READ);
    let b = recording_handler(&calls, "b", 11, EventMask::READ);
    inner.start_fd(&a).expect("Failed to start a");
    inner.start_fd(&b).expect("Failed to start b");

    let before = inner.dispatch_count();
    assert!(host.fire_fd(10, Readiness::READABLE));

    assert_eq!(calls.count("a"), 1);
    assert_eq!(calls.count("b"), 0);
    assert_eq!(calls.log.borrow()[0].1, EventMask::READ);
    assert_eq!(inner.dispatch_count(), before + 1);
}

#[test]
fn test_fd_seven_readable_scenario() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "seven", 7, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");

    let before = inner.dispatch_count();
    host.fire_fd(7, Readiness::READABLE);

    assert_eq!(handler.revents(), EventMask::READ);
    assert_eq!(calls.len(), 1);
    assert_eq!(inner.dispatch_count(), before + 1);
}

#[test]
fn test_hangup_and_error_are_not_forwarded() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 8, EventMask::READ | EventMask::WRITE);
    inner.start_fd(&handler).expect("Failed to start handler");

    host.fire_fd(8, Readiness::WRITABLE | Readiness::HANGUP | Readiness::ERROR);

    assert_eq!(calls.log.borrow()[0].1, EventMask::WRITE);
}

#[test]
fn test_emissions_follow_host_order() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 9, EventMask::READ | EventMask::WRITE);
    inner.start_fd(&handler).expect("Failed to start handler");

    host.fire_fd(9, Readiness::WRITABLE);
    host.fire_fd(9, Readiness::READABLE);
    host.fire_fd(9, Readiness::READABLE | Readiness::WRITABLE);

    let masks: Vec<_> = calls.log.borrow().iter().map(|(_, m)| *m).collect();
    assert_eq!(
        masks,
        vec![
            EventMask::WRITE,
            EventMask::READ,
            EventMask::READ | EventMask::WRITE
        ]
    );
}

#[test]
fn test_host_add_failure_rolls_back() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    host.fail_add(true);
    let handler = recording_handler(&calls, "a", 12, EventMask::READ);

    let err = inner.start_fd(&handler).unwrap_err();
    assert!(matches!(err, Error::HostRegistration { op: "add_fd", .. }));
    assert!(handler.backend_data().is_none());
    assert!(!handler.is_started());
    assert_eq!(live_entries(&inner), 0);
    assert_eq!(host.len(), 0);

    host.fail_add(false);
    inner.start_fd(&handler).expect("Failed to start handler after retry");
    assert_eq!(live_entries(&inner), 1);
}

#[test]
fn test_host_update_failure_restores_mask() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 13, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");

    host.fail_update(true);
    let err = inner.set_event_mask(&handler, EventMask::WRITE).unwrap_err();

    assert!(matches!(err, Error::HostRegistration { op: "mod_fd", .. }));
    assert_eq!(host.mask_of(13), Some(Readiness::READABLE));
    assert_eq!(handler.event_mask(), EventMask::READ);
}

#[test]
fn test_host_remove_failure_still_frees_entry() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 14, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");

    host.fail_remove(true);
    let err = inner.stop_fd(&handler).unwrap_err();

    assert!(matches!(err, Error::HostRegistration { op: "del_fd", .. }));
    assert!(!handler.is_started());
    assert!(handler.backend_data().is_none());
    assert_eq!(live_entries(&inner), 0);
}

#[test]
fn test_stop_on_unstarted_handler_is_rejected() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 15, EventMask::READ);

    let err = inner.stop_fd(&handler).unwrap_err();
    assert!(matches!(err, Error::NotRegistered { op: "stop_fd" }));
    assert!(host.removed.borrow().is_empty());
}

#[test]
fn test_double_start_is_rejected() {
    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();

    let handler = recording_handler(&calls, "a", 16, EventMask::READ);
    inner.start_fd(&handler).expect("Failed to start handler");

    let err = inner.start_fd(&handler).unwrap_err();
    assert!(matches!(err, Error::AlreadyRegistered { op: "start_fd" }));
    assert_eq!(host.len(), 1);
}

#[test]
fn test_backend_rejects_slotless_handler() {
    use conflux::Backend;

    let host = RecordingHost::new();
    let inner = conflux::init(host.clone()).expect("Failed to create bridged loop");
    let calls = Calls::new();
    let handler = recording_handler(&calls, "a", 17, EventMask::READ);

    let state = inner.state().expect("Backend state missing");
    let backend = inner.backend();

    assert!(matches!(
        backend.mod_fd(&state, &handler),
        Err(Error::NotRegistered { op: "mod_fd" })
    ));
    assert!(matches!(
        backend.del_fd(&state, &handler),
        Err(Error::NotRegistered { op: "del_fd" })
    ));
}
