use actix_web::http::Method;
use actix_web::web::Bytes;
use std::collections::HashMap;
use vanguard_rs::models::http::GatewayRequest;
use vanguard_rs::models::route::{VersionEntry, VersionRouteConfig, VersionStrategy};
use vanguard_rs::services::version_router::{ResolutionSource, VersionRouter};

fn request(path: &str, query: &str, headers: &[(&str, &str)]) -> GatewayRequest {
    GatewayRequest {
        method: Method::GET,
        path: path.to_string(),
        query: query.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: Bytes::new(),
        client_ip: None,
    }
}

fn entry(weight: u32, allow_explicit: bool) -> VersionEntry {
    VersionEntry {
        weight,
        allow_explicit,
        filter: None,
    }
}

fn config(routes: Vec<(&str, VersionEntry)>) -> VersionRouteConfig {
    VersionRouteConfig {
        strategy: vec![
            VersionStrategy::Header,
            VersionStrategy::Uri,
            VersionStrategy::Query,
        ],
        header: "X-API-Version".to_string(),
        query_param: "version".to_string(),
        routes: routes
            .into_iter()
            .map(|(version, entry)| (version.to_string(), entry))
            .collect::<HashMap<_, _>>(),
    }
}

#[test]
fn header_resolution_wins_over_sampling() {
    let router = VersionRouter::new(config(vec![
        ("v1", entry(100, false)),
        ("v2", entry(0, true)),
    ]));

    let resolution = router
        .resolve(&request("/api/users", "", &[("x-api-version", "v2")]))
        .unwrap();

    // Dark launch: weight 0 but explicitly requested and allow_explicit
    assert_eq!(resolution.version, "v2");
    assert_eq!(resolution.strategy, ResolutionSource::Header);
}

#[test]
fn uri_segment_resolves_versions() {
    let router = VersionRouter::new(config(vec![
        ("v1", entry(100, false)),
        ("v2", entry(0, true)),
    ]));

    let resolution = router.resolve(&request("/v2/users", "", &[])).unwrap();
    assert_eq!(resolution.version, "v2");
    assert_eq!(resolution.strategy, ResolutionSource::Uri);

    // A bare /v2 path also counts; /v2x does not
    let resolution = router.resolve(&request("/v2", "", &[])).unwrap();
    assert_eq!(resolution.strategy, ResolutionSource::Uri);

    let resolution = router.resolve(&request("/v2x/users", "", &[])).unwrap();
    assert_eq!(resolution.strategy, ResolutionSource::Weighted);
    assert_eq!(resolution.version, "v1");
}

#[test]
fn query_parameter_resolves_versions() {
    let router = VersionRouter::new(config(vec![
        ("v1", entry(100, false)),
        ("v2", entry(0, true)),
    ]));

    let resolution = router
        .resolve(&request("/api/users", "version=v2&page=1", &[]))
        .unwrap();
    assert_eq!(resolution.version, "v2");
    assert_eq!(resolution.strategy, ResolutionSource::Query);
}

#[test]
fn strategy_priority_order_is_respected() {
    let mut cfg = config(vec![("v1", entry(100, false)), ("v2", entry(0, true))]);
    cfg.strategy = vec![VersionStrategy::Query, VersionStrategy::Header];
    let router = VersionRouter::new(cfg);

    let resolution = router
        .resolve(&request(
            "/api/users",
            "version=v1",
            &[("x-api-version", "v2")],
        ))
        .unwrap();
    assert_eq!(resolution.version, "v1");
    assert_eq!(resolution.strategy, ResolutionSource::Query);
}

#[test]
fn unknown_explicit_version_falls_back_to_sampling() {
    let router = VersionRouter::new(config(vec![("v1", entry(100, false))]));

    let resolution = router
        .resolve(&request("/api/users", "", &[("x-api-version", "v9")]))
        .unwrap();
    assert_eq!(resolution.version, "v1");
    assert_eq!(resolution.strategy, ResolutionSource::Weighted);
}

#[test]
fn explicit_version_without_opt_in_or_weight_is_not_routable() {
    // Not allow_explicit and weight 0: the version is fully dark
    let router = VersionRouter::new(config(vec![
        ("v1", entry(100, false)),
        ("v2", entry(0, false)),
    ]));

    let resolution = router
        .resolve(&request("/api/users", "", &[("x-api-version", "v2")]))
        .unwrap();
    assert_eq!(resolution.version, "v1");
    assert_eq!(resolution.strategy, ResolutionSource::Weighted);
}

#[test]
fn sampling_excludes_explicit_only_entries() {
    let router = VersionRouter::new(config(vec![
        ("v1", entry(100, false)),
        ("v2", entry(50, true)),
    ]));

    for _ in 0..50 {
        let resolution = router.resolve(&request("/api/users", "", &[])).unwrap();
        assert_eq!(resolution.version, "v1");
        assert_eq!(resolution.strategy, ResolutionSource::Weighted);
    }
}

#[test]
fn no_weight_and_no_explicit_request_resolves_to_none() {
    let router = VersionRouter::new(config(vec![("v2", entry(0, true))]));
    assert!(router.resolve(&request("/api/users", "", &[])).is_none());
}

#[test]
fn sampling_roughly_follows_weights() {
    let router = VersionRouter::new(config(vec![
        ("v1", entry(90, false)),
        ("v2", entry(10, false)),
    ]));

    let mut v1 = 0;
    for _ in 0..1_000 {
        match router
            .resolve(&request("/api/users", "", &[]))
            .unwrap()
            .version
            .as_str()
        {
            "v1" => v1 += 1,
            "v2" => {}
            other => panic!("unexpected version {other}"),
        }
    }

    // 90/10 split with generous tolerance to keep the test stable
    assert!(v1 > 800, "expected ~900 v1 selections, got {v1}");
}

#[test]
fn version_entry_lookup() {
    let router = VersionRouter::new(config(vec![("v1", entry(100, false))]));
    assert!(router.version_entry("v1").is_some());
    assert!(router.version_entry("v2").is_none());
}
