//! Several `ChildUsage` providers observing the same children.
//!
//! One test per binary, so no other children are spawned meanwhile.

#![cfg(unix)]

use benchloop_core::resource::{ChildUsage, ChildWatcher, ResourceProvider};
use std::process::Command;

#[test]
fn test_every_provider_sees_each_exit() {
    let a = ChildUsage::new();
    let b = ChildUsage::new();

    let child = ChildWatcher::global()
        .spawn(&mut Command::new("true"))
        .expect("spawn true");
    assert!(child.wait().expect("wait").success());

    let first = a.snapshot();
    let second = b.snapshot();
    assert_eq!(a.reaped(), 1);
    assert_eq!(b.reaped(), 1);
    assert_eq!(first, second);
    assert!(second.peak_rss.is_some_and(|rss| rss > 0));

    // Created after the exit, so it never saw it.
    let late = ChildUsage::new();
    let snapshot = late.snapshot();
    assert_eq!(late.reaped(), 0);
    assert_eq!(snapshot.peak_rss, None);
}
