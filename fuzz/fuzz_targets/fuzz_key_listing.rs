#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);
    let keys = keygate::auth::pubkey::AuthorizedKeySet::parse_listing(&body);
    assert_eq!(keys.parsed_count() + keys.unparsable_count(), keys.len());
});
