use garrison::GarrisonError;
use garrison::core::route::Route;

#[test]
fn test_parse_full_route() {
    let route = Route::parse("game.testsvc.testmethod").unwrap();
    assert_eq!(route.server_type, "game");
    assert_eq!(route.service, "testsvc");
    assert_eq!(route.method, "testmethod");
    assert_eq!(route.to_string(), "game.testsvc.testmethod");
}

#[test]
fn test_parse_local_route() {
    let route = Route::parse("testsvc.testmethod").unwrap();
    assert!(route.server_type.is_empty());
    assert_eq!(route.to_string(), "testsvc.testmethod");
}

#[test]
fn test_short_name() {
    let route = Route::parse("game.testremotesvc.rpctestnotfound").unwrap();
    assert_eq!(route.short_name(), "testremotesvc.rpctestnotfound");
}

#[test]
fn test_parse_rejects_malformed_routes() {
    for raw in ["", "justone", "a.b.c.d", "a..c", ".b.c", "a.b."] {
        let err = Route::parse(raw).unwrap_err();
        assert!(
            matches!(err, GarrisonError::InvalidRoute(_)),
            "expected InvalidRoute for {raw:?}"
        );
    }
}
