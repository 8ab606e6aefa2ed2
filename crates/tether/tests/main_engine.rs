//! The process-wide main engine slot.
//!
//! Kept to a single test: the slot is global to the test binary.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tether::{Session, SessionConfig, SessionError, configure_main_engine, main_engine, testing::FakeEngine};

#[test]
fn sessions_use_the_configured_main_engine() {
    assert!(main_engine().is_none());
    let err = Session::new(SessionConfig::new()).unwrap_err();
    assert!(matches!(err, SessionError::Initialization(_)), "got {err:?}");

    let engine = Arc::new(FakeEngine::new());
    configure_main_engine(engine.clone()).unwrap();
    assert!(main_engine().is_some());

    let mut session = Session::new(SessionConfig::new()).unwrap();
    session.set_value("answer", 42_i64).unwrap();
    assert_eq!(engine.live_contexts(), 1);
    session.close().unwrap();
    assert_eq!(engine.live_contexts(), 0);

    let err = configure_main_engine(Arc::new(FakeEngine::new())).unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)), "got {err:?}");

    // a fresh session on the same thread works once the first one is closed
    let session = Session::new(SessionConfig::new()).unwrap();
    assert!(session.is_initialized());
}
