use vanguard_rs::utils::pattern::{
    compare_specificity, normalize_path, sort_by_specificity, PatternError, RoutePattern,
};

fn pattern(raw: &str) -> RoutePattern {
    RoutePattern::parse(raw).expect("pattern should compile")
}

#[test]
fn literal_pattern_matches_exact_path_only() {
    let p = pattern("/api/users");
    assert!(p.matches("/api/users").is_some());
    assert!(p.matches("/api/users/1").is_none());
    assert!(p.matches("/api").is_none());
    assert!(p.matches("/api/orders").is_none());
}

#[test]
fn param_segments_capture_values() {
    let p = pattern("/api/users/:id/posts/:post_id");
    let m = p.matches("/api/users/42/posts/7").unwrap();
    assert_eq!(m.params.get("id").map(String::as_str), Some("42"));
    assert_eq!(m.params.get("post_id").map(String::as_str), Some("7"));
    assert!(m.remaining_path.is_none());

    // Segment counts must agree for non-catch-all patterns
    assert!(p.matches("/api/users/42/posts").is_none());
    assert!(p.matches("/api/users/42/posts/7/extra").is_none());
}

#[test]
fn single_wildcard_matches_exactly_one_segment() {
    let p = pattern("/files/*/meta");
    assert!(p.matches("/files/report/meta").is_some());
    assert!(p.matches("/files/meta").is_none());
    assert!(p.matches("/files/a/b/meta").is_none());
}

#[test]
fn catch_all_matches_zero_or_more_segments() {
    let p = pattern("/api/users/**");
    assert_eq!(
        p.matches("/api/users").unwrap().remaining_path,
        Some(String::new())
    );
    assert_eq!(
        p.matches("/api/users/1").unwrap().remaining_path,
        Some("1".to_string())
    );
    assert_eq!(
        p.matches("/api/users/1/orders/2").unwrap().remaining_path,
        Some("1/orders/2".to_string())
    );
    assert!(p.matches("/api/orders").is_none());
}

#[test]
fn matching_is_deterministic() {
    let p = pattern("/api/:section/**");
    let first = p.matches("/api/users/1/2");
    let second = p.matches("/api/users/1/2");
    assert_eq!(first, second);
}

#[test]
fn trailing_slashes_are_normalized() {
    let p = pattern("/api/users/");
    assert!(p.matches("/api/users").is_some());
    assert!(pattern("/api/users").matches("/api/users/").is_some());
    assert_eq!(normalize_path("/"), "/");
    assert_eq!(normalize_path(""), "/");
    assert_eq!(normalize_path("//api//users/"), "/api/users");
}

#[test]
fn invalid_patterns_are_rejected() {
    assert!(matches!(
        RoutePattern::parse("api/users"),
        Err(PatternError::InvalidPattern { .. })
    ));
    assert!(matches!(
        RoutePattern::parse("/api/:"),
        Err(PatternError::InvalidPattern { .. })
    ));
    assert!(matches!(
        RoutePattern::parse("/api/**/users"),
        Err(PatternError::MisplacedCatchAll { .. })
    ));
}

#[test]
fn literal_beats_param_beats_wildcard_beats_catch_all() {
    let mut patterns = vec![
        pattern("/api/**"),
        pattern("/api/*"),
        pattern("/api/:name"),
        pattern("/api/users"),
    ];
    sort_by_specificity(&mut patterns);

    let order: Vec<&str> = patterns.iter().map(|p| p.raw()).collect();
    assert_eq!(order, vec!["/api/users", "/api/:name", "/api/*", "/api/**"]);
}

#[test]
fn longer_prefix_beats_shorter_catch_all() {
    let mut patterns = vec![pattern("/api/**"), pattern("/api/users/**")];
    sort_by_specificity(&mut patterns);
    assert_eq!(patterns[0].raw(), "/api/users/**");

    // Exact route beats its own catch-all extension
    let mut patterns = vec![pattern("/api/users/**"), pattern("/api/users")];
    sort_by_specificity(&mut patterns);
    assert_eq!(patterns[0].raw(), "/api/users");
}

#[test]
fn sorting_is_idempotent_and_permutation_invariant() {
    let raw = vec![
        "/api/users/:id",
        "/api/**",
        "/api/users/**",
        "/api/users",
        "/api/*",
        "/health",
    ];

    let mut sorted_once: Vec<RoutePattern> = raw.iter().map(|r| pattern(r)).collect();
    sort_by_specificity(&mut sorted_once);

    let mut sorted_twice = sorted_once.clone();
    sort_by_specificity(&mut sorted_twice);
    let once: Vec<&str> = sorted_once.iter().map(|p| p.raw()).collect();
    let twice: Vec<&str> = sorted_twice.iter().map(|p| p.raw()).collect();
    assert_eq!(once, twice);

    let mut reversed: Vec<RoutePattern> = raw.iter().rev().map(|r| pattern(r)).collect();
    sort_by_specificity(&mut reversed);
    let from_reversed: Vec<&str> = reversed.iter().map(|p| p.raw()).collect();
    assert_eq!(once, from_reversed);
}

#[test]
fn tie_break_is_lexicographic_on_raw_pattern() {
    let a = pattern("/api/:id");
    let b = pattern("/api/:name");
    assert_eq!(compare_specificity(&a, &b), std::cmp::Ordering::Less);
}

#[test]
fn first_match_in_sorted_order_is_most_specific() {
    let mut patterns = vec![
        pattern("/api/**"),
        pattern("/api/users/:id"),
        pattern("/api/users/admin"),
    ];
    sort_by_specificity(&mut patterns);

    let winner = patterns
        .iter()
        .find(|p| p.matches("/api/users/admin").is_some())
        .unwrap();
    assert_eq!(winner.raw(), "/api/users/admin");

    let winner = patterns
        .iter()
        .find(|p| p.matches("/api/users/42").is_some())
        .unwrap();
    assert_eq!(winner.raw(), "/api/users/:id");

    let winner = patterns
        .iter()
        .find(|p| p.matches("/api/other/path").is_some())
        .unwrap();
    assert_eq!(winner.raw(), "/api/**");
}
