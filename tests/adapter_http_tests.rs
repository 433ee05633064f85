//! HTTP behavior of the two marketplace services against a mock upstream:
//! request shape, response decoding and error surfacing.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use metamarket_downloader::adapters::opensea::OpenSeaService;
use metamarket_downloader::adapters::rarible::RaribleService;

#[tokio::test]
async fn opensea_events_request_carries_filters_and_parses_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/collection/decentraland"))
        .and(header("x-api-key", "test-key"))
        .and(query_param("event_type", "sale"))
        .and(query_param("before", "1672531200"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "asset_events": [
                {
                    "event_type": "order",
                    "event_timestamp": 1682935200,
                    "order_type": "sale",
                    "transaction": "0xtx",
                    "order_hash": "0xorder",
                    "chain": "ethereum",
                    "seller": "0xseller",
                    "buyer": "0xbuyer",
                    "quantity": 1,
                    "payment": {
                        "quantity": "250000000000000000",
                        "token_address": "0xmana",
                        "decimals": 18,
                        "symbol": "MANA"
                    },
                    "asset": {
                        "identifier": "1234",
                        "contract": "0xland"
                    }
                }
            ],
            "next": "next-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = OpenSeaService::new("test-key".into(), server.uri());
    let page = service
        .collection_events("decentraland", &["sale".to_string()], 1672531200, "")
        .await
        .unwrap();

    assert_eq!(page.asset_events.len(), 1);
    assert_eq!(page.next, "next-token");
    assert_eq!(page.asset_events[0].event_timestamp, 1682935200);
    assert_eq!(page.asset_events[0].order_type, "sale");
}

#[tokio::test]
async fn opensea_continuation_token_is_forwarded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/collection/decentraland"))
        .and(query_param("next", "tok-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "asset_events": [], "next": "" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = OpenSeaService::new("test-key".into(), server.uri());
    let page = service
        .collection_events("decentraland", &[], 0, "tok-2")
        .await
        .unwrap();

    assert!(page.asset_events.is_empty());
    assert!(page.next.is_empty());
}

#[tokio::test]
async fn upstream_error_list_is_joined_into_the_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": ["invalid collection", "invalid chain"]
        })))
        .mount(&server)
        .await;

    let service = OpenSeaService::new("test-key".into(), server.uri());
    let err = service
        .collection_events("decentraland", &[], 0, "")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "invalid collection|invalid chain");
}

#[tokio::test]
async fn non_json_error_surfaces_the_status_code() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let service = OpenSeaService::new("test-key".into(), server.uri());
    let err = service
        .collection_events("decentraland", &[], 0, "")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "request failed - status code 503");
}

#[tokio::test]
async fn rarible_activities_request_carries_collection_and_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/activities/byCollection"))
        .and(header("X-API-KEY", "test-key"))
        .and(query_param("collection", "ETHEREUM:0xland"))
        .and(query_param("size", "1000"))
        .and(query_param("sort", "EARLIEST_FIRST"))
        .and(query_param("type", "SELL"))
        .and(query_param("cursor", "cur-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cursor": "cur-2",
            "activities": [
                {
                    "id": "ETHEREUM:abc",
                    "@type": "SELL",
                    "date": "2023-05-01T10:00:00Z",
                    "cursor": "cur-1a",
                    "maker": "ETHEREUM:0xmaker",
                    "seller": "ETHEREUM:0xseller",
                    "buyer": "ETHEREUM:0xbuyer",
                    "source": "RARIBLE"
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = RaribleService::new("test-key".into(), server.uri());
    let page = service
        .collection_activities("ethereum", "0xLAND", &["SELL".to_string()], "cur-1")
        .await
        .unwrap();

    assert_eq!(page.cursor, "cur-2");
    assert_eq!(page.activities.len(), 1);
    assert_eq!(page.activities[0].kind, "SELL");
    assert_eq!(page.activities[0].id, "ETHEREUM:abc");
}

#[tokio::test]
async fn rarible_empty_feed_parses_cleanly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/activities/byCollection"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "cursor": "", "activities": [] })),
        )
        .mount(&server)
        .await;

    let service = RaribleService::new("test-key".into(), server.uri());
    let page = service
        .collection_activities("ethereum", "0xland", &[], "")
        .await
        .unwrap();

    assert!(page.cursor.is_empty());
    assert!(page.activities.is_empty());
}
