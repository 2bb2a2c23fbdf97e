use garrison::config::NatsConfig;
use garrison::core::cluster::NatsRpcClient;
use garrison::core::cluster::server::ServerInfo;
use garrison::core::context::PropagateCtx;
use garrison::core::message::Message;
use garrison::core::protocol::{Error, MsgKind, Request, Response, RpcType};
use garrison::core::route::Route;
use garrison::core::session::SessionRegistry;
use std::collections::HashMap;
use std::sync::Arc;

fn client(frontend: bool) -> NatsRpcClient {
    let server = Arc::new(ServerInfo::new(
        "local-1",
        "connector",
        frontend,
        HashMap::new(),
    ));
    NatsRpcClient::new(&NatsConfig::default(), server).unwrap()
}

#[test]
fn test_sys_request_carries_session_and_msg_id() {
    let client = client(true);
    let sessions = SessionRegistry::new();
    let session = sessions.open_session("local-1");
    sessions.bind(&session, "u1").unwrap();

    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::request(77, "game.testsvc.testmethod", b"payload".to_vec());
    let req = client
        .build_request(&PropagateCtx::new(), RpcType::Sys, &route, Some(&session), &msg)
        .unwrap();

    let block = req.session.expect("sys request must carry a session block");
    assert_eq!(block.id, session.id());
    assert_eq!(block.uid, "u1");
    assert_eq!(req.msg.as_ref().unwrap().id, 77);
    assert_eq!(req.msg.as_ref().unwrap().kind, MsgKind::MsgRequest as i32);
}

#[test]
fn test_sys_notify_zeroes_msg_id() {
    let client = client(true);
    let sessions = SessionRegistry::new();
    let session = sessions.open_session("local-1");

    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::notify("game.testsvc.testmethod", Vec::new());
    let req = client
        .build_request(&PropagateCtx::new(), RpcType::Sys, &route, Some(&session), &msg)
        .unwrap();

    assert_eq!(req.msg.as_ref().unwrap().id, 0);
    assert_eq!(req.msg.as_ref().unwrap().kind, MsgKind::MsgNotify as i32);
}

#[test]
fn test_user_request_omits_session() {
    let client = client(false);
    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::request(5, "game.testsvc.testmethod", Vec::new());
    let req = client
        .build_request(&PropagateCtx::new(), RpcType::User, &route, None, &msg)
        .unwrap();

    assert!(req.session.is_none());
    assert_eq!(req.msg.as_ref().unwrap().id, 0);
}

#[test]
fn test_frontend_id_stamped_only_for_frontends() {
    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::request(1, "game.testsvc.testmethod", Vec::new());

    let req = client(true)
        .build_request(&PropagateCtx::new(), RpcType::User, &route, None, &msg)
        .unwrap();
    assert_eq!(req.frontend_id, "local-1");

    let req = client(false)
        .build_request(&PropagateCtx::new(), RpcType::User, &route, None, &msg)
        .unwrap();
    assert!(req.frontend_id.is_empty());
}

#[test]
fn test_metadata_absent_for_empty_context() {
    let client = client(false);
    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::request(1, "game.testsvc.testmethod", Vec::new());

    let req = client
        .build_request(&PropagateCtx::new(), RpcType::User, &route, None, &msg)
        .unwrap();
    assert!(req.metadata.is_empty());

    let ctx = PropagateCtx::new().add("peer.id", "n-1");
    let req = client
        .build_request(&ctx, RpcType::User, &route, None, &msg)
        .unwrap();
    assert!(!req.metadata.is_empty());
}

#[test]
fn test_request_envelope_roundtrip() {
    let client = client(true);
    let route = Route::parse("game.testsvc.testmethod").unwrap();
    let msg = Message::request(9, "game.testsvc.testmethod", b"woow".to_vec());
    let req = client
        .build_request(&PropagateCtx::new(), RpcType::User, &route, None, &msg)
        .unwrap();

    let decoded = Request::decode_bytes(&req.encode_bytes()).unwrap();
    assert_eq!(decoded, req);
    assert_eq!(decoded.msg.unwrap().data, b"woow");
}

#[test]
fn test_response_error_code_defaults_to_unknown() {
    let res = Response {
        data: Vec::new(),
        error: Some(Error {
            code: String::new(),
            msg: "somerror".to_string(),
            metadata: HashMap::new(),
        }),
    };
    let decoded = Response::decode_bytes(&res.encode_bytes()).unwrap();
    assert_eq!(decoded.error.unwrap().code, "PIT-000");
}

#[test]
fn test_response_error_metadata_roundtrip() {
    let mut metadata = HashMap::new();
    metadata.insert("route".to_string(), "testremotesvc.rpctestnotfound".to_string());
    let res = Response {
        data: Vec::new(),
        error: Some(Error {
            code: "PIT-404".to_string(),
            msg: "route not found".to_string(),
            metadata,
        }),
    };

    let decoded = Response::decode_bytes(&res.encode_bytes()).unwrap();
    let error = decoded.error.unwrap();
    assert_eq!(error.code, "PIT-404");
    assert_eq!(error.msg, "route not found");
    assert_eq!(
        error.metadata.get("route").map(String::as_str),
        Some("testremotesvc.rpctestnotfound")
    );
}

#[test]
fn test_successful_response_has_no_error() {
    let res = Response {
        data: b"ack".to_vec(),
        error: None,
    };
    let decoded = Response::decode_bytes(&res.encode_bytes()).unwrap();
    assert!(decoded.error.is_none());
    assert_eq!(decoded.data, b"ack");
}
