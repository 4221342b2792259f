use super::*;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::services::test_keys::{TEST_PRIVATE_KEY_PEM, TEST_PUBLIC_KEY_PEM};
use crate::services::trade::UserTradeInfo;

fn completed_pair() -> TradePair {
    TradePair {
        a: UserTradeInfo {
            user_id: "alice".into(),
            inventory: vec!["sword".into()],
            locked_in: true,
            accepted: true,
        },
        b: UserTradeInfo {
            user_id: "bob".into(),
            inventory: vec!["shield".into(), "potion".into()],
            locked_in: true,
            accepted: true,
        },
    }
}

fn client() -> SettlementClient {
    SettlementClient::new("https://settlement.test/performTrade".into(), TEST_PRIVATE_KEY_PEM)
        .expect("test client")
}

#[test]
fn claims_bind_both_user_ids_in_pair_order() {
    let claims = settlement_claims(&completed_pair(), 1_000);
    assert_eq!(claims.user_ids, ["alice".to_string(), "bob".to_string()]);
    assert_eq!(claims.exp, 1_000);
}

#[test]
fn claims_serialize_with_camel_case_keys() {
    let json = serde_json::to_value(settlement_claims(&completed_pair(), 42)).unwrap();
    assert_eq!(json["userIds"][0], "alice");
    assert_eq!(json["userIds"][1], "bob");
    assert_eq!(json["exp"], 42);
    assert!(json.get("user_ids").is_none());
}

#[test]
fn request_body_has_trade_info_wire_shape() {
    let pair = completed_pair();
    let body = SettlementRequest { trade_info: [&pair.a, &pair.b] };
    let json = serde_json::to_value(&body).unwrap();

    let trade_info = json["tradeInfo"].as_array().expect("tradeInfo array");
    assert_eq!(trade_info.len(), 2);
    assert_eq!(trade_info[0]["userId"], "alice");
    assert_eq!(trade_info[0]["inventory"][0], "sword");
    assert_eq!(trade_info[0]["lockedIn"], true);
    assert_eq!(trade_info[0]["accepted"], true);
    assert_eq!(trade_info[1]["userId"], "bob");
    assert_eq!(trade_info[1]["inventory"][1], "potion");
}

#[test]
fn bearer_token_round_trips_against_the_public_key() {
    let pair = completed_pair();
    let exp = now_secs() + TOKEN_TTL_SECS;
    let token = client().bearer_token(&pair, exp).unwrap();

    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY_PEM.as_bytes()).unwrap();
    let data =
        jsonwebtoken::decode::<SettlementClaims>(&token, &key, &Validation::new(Algorithm::RS256))
            .expect("token verifies");
    assert_eq!(data.claims.user_ids, ["alice".to_string(), "bob".to_string()]);
    assert_eq!(data.claims.exp, exp);
}

#[test]
fn bad_signing_key_fails_construction() {
    let err = SettlementClient::new("https://settlement.test".into(), "not a pem").unwrap_err();
    assert!(matches!(err, SettlementError::SigningKey(_)));
}
