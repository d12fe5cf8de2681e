use bitcoin_relay_core::header_chain::validate_header_chain;
use bitcoin_relay_core::retarget::validate_difficulty_change;
use bitcoin_relay_core::target::{compare_targets, decode_target, encode_target};
use bitcoin_relay_core::{
    BlockHeader, Digest, ErrorCode, MemoryStore, Network, NetworkParams, Relay, RelayError,
    RelayEvent, StoredHeader,
};
use crypto_bigint::U256;
use serde::Deserialize;

const FIXTURES: &str = include_str!("data/header_fixtures.json");

#[derive(Deserialize)]
struct FixtureHeader {
    hex: String,
    height: u32,
}

impl FixtureHeader {
    fn header(&self) -> BlockHeader {
        BlockHeader::from_hex(&self.hex).unwrap()
    }

    fn stored(&self) -> StoredHeader {
        StoredHeader::new(self.header(), self.height, U256::ZERO)
    }
}

#[derive(Deserialize)]
struct ChainCase {
    description: String,
    network: Network,
    anchor: FixtureHeader,
    headers: Vec<FixtureHeader>,
    internal: bool,
    is_mainnet: bool,
    expected_error_code: u32,
}

#[derive(Deserialize)]
struct DifficultyChangeCase {
    description: String,
    network: Network,
    prev_epoch_start: FixtureHeader,
    anchor: FixtureHeader,
    headers: Vec<FixtureHeader>,
    expected_error_code: u32,
}

#[derive(Deserialize)]
struct CompareCase {
    full: String,
    truncated: String,
    expected: bool,
}

#[derive(Deserialize)]
struct Fixtures {
    chain: Vec<ChainCase>,
    difficulty_change: Vec<DifficultyChangeCase>,
    compare_targets: Vec<CompareCase>,
}

fn load() -> Fixtures {
    serde_json::from_str(FIXTURES).unwrap()
}

fn code(result: &Result<Digest, RelayError>) -> u32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code().as_u32(),
    }
}

fn headers(list: &[FixtureHeader]) -> Vec<BlockHeader> {
    list.iter().map(FixtureHeader::header).collect()
}

#[test]
fn test_chain_fixtures() {
    let fixtures = load();
    assert!(!fixtures.chain.is_empty());
    for case in &fixtures.chain {
        let params = case.network.params();
        let headers = headers(&case.headers);
        let result = validate_header_chain(
            &case.anchor.header(),
            &headers,
            case.internal,
            case.is_mainnet,
            &params,
        );
        assert_eq!(code(&result), case.expected_error_code, "{}", case.description);
        if let Ok(tip) = result {
            assert_eq!(tip, headers.last().unwrap().digest(), "{}", case.description);
            for header in &headers {
                assert!(header.digest().to_u256() <= decode_target(header.bits).unwrap());
            }
        }
    }
}

#[test]
fn test_chain_fixtures_through_relay() {
    let fixtures = load();
    for case in &fixtures.chain {
        // The engine derives the validator's mainnet flag from its params.
        let params = NetworkParams {
            allow_min_difficulty_blocks: !case.is_mainnet,
            ..case.network.params()
        };
        let anchor = case.anchor.header();
        let headers = headers(&case.headers);

        let mut relay = Relay::new(MemoryStore::new(), Vec::new(), params);
        relay.ingest_header(anchor.clone(), case.anchor.height).unwrap();
        let before = relay.store().clone();
        let result = relay.ingest_headers(&headers, case.internal);

        // The engine resolves the anchor from the first header's parent.
        let expected = if headers[0].prev_block_hash == anchor.digest() {
            case.expected_error_code
        } else {
            ErrorCode::UnknownBlock.as_u32()
        };
        assert_eq!(code(&result), expected, "{}", case.description);

        if result.is_ok() {
            for (fixture, header) in case.headers.iter().zip(&headers) {
                let stored = relay.get_header(&header.digest()).unwrap();
                assert_eq!(stored.height, fixture.height, "{}", case.description);
            }
            assert_eq!(
                relay.events(),
                &vec![RelayEvent::Extension {
                    from: anchor.digest(),
                    to: headers.last().unwrap().digest(),
                    from_height: case.anchor.height,
                    to_height: case.headers.last().unwrap().height,
                }],
                "{}",
                case.description
            );
        } else {
            assert!(relay.events().is_empty(), "{}", case.description);
            assert_eq!(relay.store(), &before, "{}", case.description);
        }
    }
}

#[test]
fn test_difficulty_change_fixtures() {
    let fixtures = load();
    assert!(!fixtures.difficulty_change.is_empty());
    for case in &fixtures.difficulty_change {
        let params = case.network.params();
        let headers = headers(&case.headers);
        let result = validate_difficulty_change(
            &headers,
            &case.prev_epoch_start.stored(),
            &case.anchor.stored(),
            &params,
        );
        assert_eq!(code(&result), case.expected_error_code, "{}", case.description);
    }
}

#[test]
fn test_difficulty_change_fixtures_through_relay() {
    let fixtures = load();
    for case in &fixtures.difficulty_change {
        let mut relay = Relay::new(MemoryStore::new(), Vec::new(), case.network.params());
        let start = relay
            .ingest_header(case.prev_epoch_start.header(), case.prev_epoch_start.height)
            .unwrap();
        relay
            .ingest_header(case.anchor.header(), case.anchor.height)
            .unwrap();
        relay.set_current_epoch_difficulty(U256::from_u32(42)).unwrap();
        let before = relay.store().clone();

        let headers = headers(&case.headers);
        let result = relay.ingest_difficulty_change(&start, &headers);
        assert_eq!(code(&result), case.expected_error_code, "{}", case.description);

        if result.is_ok() {
            let last = headers.last().unwrap();
            assert_eq!(relay.prev_epoch_difficulty().unwrap(), U256::from_u32(42));
            assert_eq!(
                relay.current_epoch_difficulty().unwrap(),
                decode_target(last.bits).unwrap()
            );
            assert_eq!(
                relay.events(),
                &vec![RelayEvent::Extension {
                    from: case.anchor.header().digest(),
                    to: last.digest(),
                    from_height: case.anchor.height,
                    to_height: case.anchor.height + headers.len() as u32,
                }]
            );
        } else {
            assert_eq!(relay.store(), &before, "{}", case.description);
            assert!(relay.events().is_empty());
        }
    }
}

#[test]
fn test_compare_target_fixtures() {
    let fixtures = load();
    for case in &fixtures.compare_targets {
        let full = U256::from_be_hex(&case.full);
        let truncated = U256::from_be_hex(&case.truncated);
        assert_eq!(
            compare_targets(&full, &truncated),
            case.expected,
            "{} vs {}",
            case.full,
            case.truncated
        );
        // Reflexive for any value.
        assert!(compare_targets(&full, &full));
    }
}

#[test]
fn test_fixture_bits_round_trip() {
    let fixtures = load();
    let all_headers = fixtures
        .chain
        .iter()
        .flat_map(|case| case.headers.iter().chain(std::iter::once(&case.anchor)))
        .chain(
            fixtures
                .difficulty_change
                .iter()
                .flat_map(|case| case.headers.iter().chain([&case.anchor, &case.prev_epoch_start])),
        );
    for fixture in all_headers {
        let bits = fixture.header().bits;
        assert_eq!(encode_target(&decode_target(bits).unwrap()), bits);
    }
}
