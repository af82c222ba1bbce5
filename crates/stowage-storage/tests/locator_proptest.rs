//! Property tests for object URLs

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use stowage_storage::locator::{decode, encode, ObjectLocator};

fn account() -> impl Strategy<Value = String> {
    "[a-z0-9]{3,24}"
}

fn container() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{2,20}"
}

fn blob_name() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9 ._%#?é~-]{1,20}", 1..5).prop_map(|segments| segments.join("/"))
}

proptest! {
    #[test]
    fn decode_inverts_encode(account in account(), container in container(), blob in blob_name()) {
        let url = encode(&account, &container, &blob);
        let locator = decode(&url).unwrap();
        prop_assert_eq!(locator, ObjectLocator::new(account, container, blob));
    }

    #[test]
    fn account_is_returned_lowercased(account in "[a-zA-Z0-9]{3,24}", container in container(), blob in blob_name()) {
        let locator = decode(&encode(&account, &container, &blob)).unwrap();
        prop_assert_eq!(locator.account_name, account.to_ascii_lowercase());
        prop_assert_eq!(locator.blob_name, blob);
    }

    #[test]
    fn encoded_url_has_no_query_or_fragment(account in account(), container in container(), blob in blob_name()) {
        let url = encode(&account, &container, &blob);
        prop_assert!(!url.contains('?'));
        prop_assert!(!url.contains('#'));
        prop_assert!(!url.contains(' '));
    }

    #[test]
    fn query_and_fragment_are_ignored(account in account(), container in container(), blob in blob_name()) {
        let url = format!("{}?sv=2024&sig=x#frag", encode(&account, &container, &blob));
        let locator = decode(&url).unwrap();
        prop_assert_eq!(locator.blob_name, blob);
    }

    #[test]
    fn foreign_hosts_are_rejected(host in "[a-z]{3,10}\\.(com|net|org)", container in container()) {
        let url = format!("https://{}/{}/blob", host, container);
        prop_assert!(decode(&url).is_err());
    }

    #[test]
    fn container_only_urls_are_rejected(account in account(), container in container()) {
        let url = format!("https://{}.blob.core.windows.net/{}", account, container);
        prop_assert!(decode(&url).is_err());
        let slashed = format!("{}/", url);
        prop_assert!(decode(&slashed).is_err());
    }
}
