use std::collections::BTreeMap;

use serde_json::json;
use spl::{
    types::Request,
    validation::{
        Validator,
        error::ValidatorErrorKind,
        types::{AuthorizationConfig, RateLimitConfig, ValidatorConfig},
    },
};

fn validator(config: ValidatorConfig) -> Validator {
    Validator::new(&config).expect("validator config is valid")
}

#[test]
fn given_content_outside_length_bounds_when_validated_then_format_error_is_returned() {
    let validator = validator(ValidatorConfig::default());

    let short = validator
        .validate(&Request::new("u1", "hey"))
        .expect_err("too short");
    assert_eq!(short.kind, ValidatorErrorKind::Format);

    let long = validator
        .validate(&Request::new("u1", "x".repeat(1001)))
        .expect_err("too long");
    assert_eq!(long.kind, ValidatorErrorKind::Format);

    validator
        .validate(&Request::new("u1", "x".repeat(1000)))
        .expect("exactly max length is fine");
    validator
        .validate(&Request::new("u1", "héllo"))
        .expect("length counts characters, not bytes");
}

#[test]
fn given_blocklisted_term_in_any_case_when_validated_then_request_is_blocked() {
    let validator = validator(ValidatorConfig {
        blocklist: vec!["Malicious".to_string()],
        ..ValidatorConfig::default()
    });

    let err = validator
        .validate(&Request::new("u1", "totally MALICIOUS payload"))
        .expect_err("blocked term");
    assert_eq!(err.kind, ValidatorErrorKind::Blocked);
    assert!(err.to_string().contains("malicious"));
}

#[test]
fn given_requester_without_capability_when_validated_then_unauthorized() {
    let validator = validator(ValidatorConfig {
        authorization: AuthorizationConfig {
            required_capability: Some("classify".to_string()),
            grants: BTreeMap::from([("alice".to_string(), vec!["classify".to_string()])]),
        },
        ..ValidatorConfig::default()
    });

    validator
        .validate(&Request::new("alice", "please sort this"))
        .expect("alice holds the capability");
    let err = validator
        .validate(&Request::new("mallory", "please sort this"))
        .expect_err("mallory does not");
    assert_eq!(err.kind, ValidatorErrorKind::Unauthorized);
}

#[test]
fn given_ceiling_reached_when_validated_then_only_that_requester_is_limited() {
    let validator = validator(ValidatorConfig {
        rate_limit: RateLimitConfig {
            window_ms: 60_000,
            max_requests: 2,
        },
        ..ValidatorConfig::default()
    });

    for _ in 0..2 {
        validator
            .validate(&Request::new("u1", "within quota"))
            .expect("under the ceiling");
    }
    let err = validator
        .validate(&Request::new("u1", "within quota"))
        .expect_err("third request in the window");
    assert_eq!(err.kind, ValidatorErrorKind::RateLimited);

    validator
        .validate(&Request::new("u2", "within quota"))
        .expect("other requesters keep their own window");

    validator.reset_rate_limits();
    validator
        .validate(&Request::new("u1", "within quota"))
        .expect("reset clears the window");
}

#[test]
fn given_format_failure_when_validated_then_rate_quota_is_not_consumed() {
    let validator = validator(ValidatorConfig {
        rate_limit: RateLimitConfig {
            window_ms: 60_000,
            max_requests: 1,
        },
        ..ValidatorConfig::default()
    });

    validator
        .validate(&Request::new("u1", "no"))
        .expect_err("too short");
    validator
        .validate(&Request::new("u1", "long enough"))
        .expect("quota is still available");

    let stats = validator.stats();
    assert_eq!(stats.validations, 2);
    assert_eq!(stats.rejections, 1);
}

#[test]
fn given_envelope_schema_when_context_is_missing_then_schema_error_is_returned() {
    let validator = validator(ValidatorConfig {
        envelope_schema: Some(json!({
            "type": "object",
            "properties": {
                "context": { "type": "object", "required": ["channel"] }
            }
        })),
        ..ValidatorConfig::default()
    });

    let err = validator
        .validate(&Request::new("u1", "hello world"))
        .expect_err("channel is required");
    assert_eq!(err.kind, ValidatorErrorKind::Schema);

    validator
        .validate(&Request::new("u1", "hello world").with_context("channel", "sms"))
        .expect("channel present");
}

#[test]
fn given_invalid_configs_when_built_then_errors_are_returned() {
    let inverted = ValidatorConfig {
        min_length: 10,
        max_length: 5,
        ..ValidatorConfig::default()
    };
    let err = Validator::new(&inverted).err().expect("inverted bounds");
    assert_eq!(err.kind, ValidatorErrorKind::InvalidConfig);

    let bad_schema = ValidatorConfig {
        envelope_schema: Some(json!({ "type": 12 })),
        ..ValidatorConfig::default()
    };
    let err = Validator::new(&bad_schema).err().expect("uncompilable schema");
    assert_eq!(err.kind, ValidatorErrorKind::InvalidConfig);
}

#[test]
fn given_runtime_blocklist_updates_when_validated_then_they_take_effect() {
    let validator = validator(ValidatorConfig::default());

    assert!(validator.add_to_blocklist("  Spoiler ").expect("valid term"));
    assert!(!validator.add_to_blocklist("spoiler").expect("duplicate term"));
    assert!(validator.add_to_blocklist("   ").is_err());
    assert_eq!(validator.stats().blocklist_size, 1);

    validator
        .validate(&Request::new("u1", "big spoiler ahead"))
        .expect_err("blocked");
    assert!(validator.remove_from_blocklist("SPOILER"));
    validator
        .validate(&Request::new("u1", "big spoiler ahead"))
        .expect("no longer blocked");
}
