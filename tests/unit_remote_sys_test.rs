use garrison::GarrisonError;
use garrison::core::session::{SessionRegistry, SessionSnapshot, SysRemote};
use std::collections::HashMap;
use std::sync::Arc;

fn data(entries: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_bind_session() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions.clone());
    let session = sessions.open_session("front-1");

    let snapshot = SessionSnapshot {
        id: session.id(),
        uid: "u1".to_string(),
        data: data(&[("hello", serde_json::json!("test"))]),
    };

    let res = sys.bind_session(&snapshot).unwrap();
    assert_eq!(&res[..], &b"ack"[..]);
    assert_eq!(session.uid(), "u1");
    assert_eq!(
        sessions.session_by_uid("u1").unwrap().id(),
        session.id()
    );
    assert_eq!(session.data(), snapshot.data);
}

#[tokio::test]
async fn test_bind_session_errors_if_not_exists() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions);

    let snapshot = SessionSnapshot {
        id: 133,
        uid: "u1".to_string(),
        data: data(&[("hello", serde_json::json!("test"))]),
    };

    let err = sys.bind_session(&snapshot).unwrap_err();
    assert!(matches!(err, GarrisonError::SessionNotFound));
}

#[tokio::test]
async fn test_bind_session_errors_if_already_bound() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions.clone());
    let session = sessions.open_session("front-1");

    let snapshot = SessionSnapshot {
        id: session.id(),
        uid: "u1".to_string(),
        data: HashMap::new(),
    };

    sys.bind_session(&snapshot).unwrap();
    // Re-binding the same pair is reported as already bound; callers treat it
    // as a no-op.
    let err = sys.bind_session(&snapshot).unwrap_err();
    assert!(matches!(err, GarrisonError::SessionAlreadyBound));
    assert_eq!(session.uid(), "u1");
}

#[tokio::test]
async fn test_push_session() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions.clone());
    let session = sessions.open_session("front-1");

    let snapshot = SessionSnapshot {
        id: session.id(),
        uid: "ignored".to_string(),
        data: data(&[
            ("hello", serde_json::json!("test")),
            ("hello22", serde_json::json!(2)),
        ]),
    };

    let res = sys.push_session(&snapshot).unwrap();
    assert_eq!(&res[..], &b"ack"[..]);
    assert_eq!(session.data(), snapshot.data);
    // A push never binds.
    assert!(!session.is_bound());
}

#[tokio::test]
async fn test_push_session_overwrites_previous_data() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions.clone());
    let session = sessions.open_session("front-1");
    session.set_data(data(&[("stale", serde_json::json!(true))]));

    let snapshot = SessionSnapshot {
        id: session.id(),
        uid: String::new(),
        data: data(&[("fresh", serde_json::json!(1))]),
    };
    sys.push_session(&snapshot).unwrap();

    assert!(session.data().contains_key("fresh"));
    assert!(!session.data().contains_key("stale"));
}

#[tokio::test]
async fn test_push_session_fails_if_session_doesnt_exist() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions);

    let snapshot = SessionSnapshot {
        id: 343,
        uid: "u1".to_string(),
        data: HashMap::new(),
    };

    let err = sys.push_session(&snapshot).unwrap_err();
    assert!(matches!(err, GarrisonError::SessionNotFound));
}

#[tokio::test]
async fn test_close_session_drops_both_indices() {
    let sessions = Arc::new(SessionRegistry::new());
    let sys = SysRemote::new(sessions.clone());
    let session = sessions.open_session("front-1");

    let snapshot = SessionSnapshot {
        id: session.id(),
        uid: "u1".to_string(),
        data: HashMap::new(),
    };
    sys.bind_session(&snapshot).unwrap();

    sessions.close_session(session.id());
    assert!(sessions.session_by_id(session.id()).is_none());
    assert!(sessions.session_by_uid("u1").is_none());
}
