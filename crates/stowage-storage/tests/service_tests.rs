//! End-to-end tests of the storage service against the in-memory store

#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use stowage_config::{ConfigField, FactorySource, StorageConfiguration, StorageOverride};
use stowage_storage::mock::{Fault, FaultPoint, MemoryBlobStore, MemoryClientFactory, Operation};
use stowage_storage::{
    decode, AccessCause, Error, ObjectLocator, OperationOptions, ServiceUrlProvider,
    StorageService, StrategyKind, UploadRequest, CHUNK_SIZE,
};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    let _ = stowage_observability::try_init_tracing("warn");
}

fn sas_config() -> StorageConfiguration {
    StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc")
}

fn service_with(config: StorageConfiguration) -> (StorageService, MemoryClientFactory) {
    init_logging();
    let factory = MemoryClientFactory::new();
    let service = StorageService::new(config, Arc::new(factory.clone()));
    (service, factory)
}

#[tokio::test]
async fn test_upload_then_download() {
    let (service, factory) = service_with(sas_config());
    let options = OperationOptions::new();

    let url = service
        .upload(UploadRequest::from_bytes("test.txt", Bytes::from_static(b"test")), &options)
        .await
        .unwrap();

    assert_eq!(decode(&url).unwrap(), ObjectLocator::new("acct", "c1", "test.txt"));
    assert_eq!(factory.store().containers().await, vec!["c1".to_string()]);

    let data = service.download(&url, &options).await.unwrap();
    assert_eq!(&data[..], b"test");
    assert_eq!(factory.built(), vec![StrategyKind::SasToken]);
}

#[tokio::test]
async fn test_upload_nested_name_round_trips() {
    let (service, _) = service_with(sas_config());
    let options = OperationOptions::new();

    let url = service
        .upload(
            UploadRequest::from_bytes("reports/2024/q1 summary.pdf", Bytes::from_static(b"%PDF")),
            &options,
        )
        .await
        .unwrap();
    assert_eq!(
        url,
        "https://acct.blob.core.windows.net/c1/reports/2024/q1%20summary.pdf"
    );
    assert_eq!(&service.download(&url, &options).await.unwrap()[..], b"%PDF");
}

#[tokio::test]
async fn test_invalid_requests_make_no_calls() {
    let (service, factory) = service_with(sas_config());
    let options = OperationOptions::new();

    let requests = vec![
        UploadRequest {
            name: "test.txt".to_string(),
            content: None,
            size: 4,
            content_type: None,
        },
        UploadRequest::from_bytes("", Bytes::from_static(b"test")),
        UploadRequest::from_bytes("test.txt", Bytes::new()),
    ];

    for request in requests {
        let err = service.upload(request, &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }
    assert!(factory.store().operations().await.is_empty());
    assert!(factory.built().is_empty());
}

#[tokio::test]
async fn test_listing_denied_uses_probe() {
    let (service, factory) = service_with(sas_config());
    let store = factory.store();
    store.create("c1").await;
    store.inject(FaultPoint::ListContainers, Fault::PermissionDenied).await;

    service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap();

    let ops = store.operations().await;
    assert_eq!(ops[0], Operation::ListContainers);
    assert_eq!(ops[1], Operation::ProbeContainer("c1".to_string()));
    assert!(!ops.contains(&Operation::CreateContainer("c1".to_string())));
}

#[tokio::test]
async fn test_listing_denied_and_container_missing_creates_it() {
    let (service, factory) = service_with(sas_config());
    let store = factory.store();
    store.inject(FaultPoint::ListContainers, Fault::PermissionDenied).await;

    service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap();
    assert!(store
        .operations()
        .await
        .contains(&Operation::CreateContainer("c1".to_string())));
}

#[tokio::test]
async fn test_racing_container_creation_is_tolerated() {
    let (service, factory) = service_with(sas_config());
    let store = factory.store();
    store.inject(FaultPoint::CreateContainer, Fault::AlreadyExists).await;

    service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap();

    let ops = store.operations().await;
    assert!(ops.contains(&Operation::CreateContainer("c1".to_string())));
    assert!(store.blob("c1", "a.txt").await.is_some());
}

#[tokio::test]
async fn test_account_not_found_names_account_field() {
    let (service, factory) = service_with(sas_config());
    factory
        .store()
        .inject(FaultPoint::ListContainers, Fault::AccountNotFound)
        .await;

    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.access_cause(), Some(AccessCause::AccountNotFound));
    assert!(err.to_string().contains("\"account_name\""));
}

#[tokio::test]
async fn test_write_failure_is_upload_error() {
    let (service, factory) = service_with(sas_config());
    factory.store().inject(FaultPoint::PutBlob, Fault::Transport).await;

    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upload { ref name, .. } if name == "a.txt"));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (service, factory) = service_with(sas_config());
    let options = OperationOptions::new();
    let url = service
        .upload(UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")), &options)
        .await
        .unwrap();

    assert!(service.delete(&url, &options).await.unwrap());
    assert!(factory.store().blob("c1", "a.txt").await.is_none());
    assert!(service.delete(&url, &options).await.unwrap());

    let missing = "https://acct.blob.core.windows.net/c1/never-existed.bin";
    assert!(service.delete(missing, &options).await.unwrap());
}

#[tokio::test]
async fn test_delete_refused_is_error() {
    let (service, factory) = service_with(sas_config());
    factory
        .store()
        .inject(FaultPoint::DeleteBlob, Fault::PermissionDenied)
        .await;

    let err = service
        .delete(
            "https://acct.blob.core.windows.net/c1/a.txt",
            &OperationOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Delete { .. }));
}

#[tokio::test]
async fn test_download_missing_object() {
    let (service, _) = service_with(sas_config());
    let err = service
        .download(
            "https://acct.blob.core.windows.net/c1/missing.txt",
            &OperationOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Download { ref name, .. } if name == "missing.txt"));
    assert!(err.storage_error().unwrap().is_not_found());
}

#[tokio::test]
async fn test_download_rejects_foreign_url() {
    let (service, factory) = service_with(sas_config());
    let err = service
        .download("https://example.com/c1/a.txt", &OperationOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedLocator { .. }));
    assert!(factory.built().is_empty());
}

#[tokio::test]
async fn test_strategy_follows_configured_credential() {
    let cases = [
        (
            StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc"),
            StrategyKind::SasToken,
        ),
        (
            StorageConfiguration::new("acct", "c1").with_account_key("a2V5"),
            StrategyKind::SharedKey,
        ),
        (
            StorageConfiguration::new("acct", "c1")
                .with_connection_string("AccountName=acct;AccountKey=a2V5"),
            StrategyKind::ConnectionString,
        ),
    ];

    for (config, expected) in cases {
        let (service, factory) = service_with(config);
        service
            .upload(
                UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
                &OperationOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(factory.built(), vec![expected]);
    }
}

#[tokio::test]
async fn test_ambient_credential() {
    init_logging();
    let factory = MemoryClientFactory::new().with_ambient(true);
    let service = StorageService::new(
        StorageConfiguration::new("acct", "c1"),
        Arc::new(factory.clone()),
    );
    service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(factory.built(), vec![StrategyKind::Ambient]);
}

#[tokio::test]
async fn test_missing_credential_without_ambient() {
    let (service, factory) = service_with(StorageConfiguration::new("acct", "c1"));
    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(factory.built().is_empty());
}

#[tokio::test]
async fn test_cached_client_reused_only_for_unchanged_configuration() {
    let (service, factory) = service_with(sas_config());
    let upload = |name: &'static str| UploadRequest::from_bytes(name, Bytes::from_static(b"a"));

    service.upload(upload("a"), &OperationOptions::new()).await.unwrap();
    service.upload(upload("b"), &OperationOptions::new()).await.unwrap();
    assert_eq!(factory.built().len(), 1);

    let changed = OperationOptions::new().with_overrides(StorageOverride::new().with_container_name("c2"));
    service.upload(upload("c"), &changed).await.unwrap();
    service.upload(upload("d"), &changed).await.unwrap();
    assert_eq!(factory.built().len(), 3);
    assert!(factory.store().blob("c2", "d").await.is_some());
}

#[tokio::test]
async fn test_cleared_account_name_fails() {
    let (service, _) = service_with(sas_config());
    let options = OperationOptions::new()
        .with_overrides(StorageOverride::new().clear(ConfigField::AccountName));

    let err = service
        .upload(UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")), &options)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error encountered: \"account_name\" was not provided."
    );
}

#[tokio::test]
async fn test_override_from_json_null_clears_field() {
    let (service, _) = service_with(sas_config());
    let overrides: StorageOverride = serde_json::from_str(r#"{"sas_key": null}"#).unwrap();
    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new().with_overrides(overrides),
        )
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_get_service_url() {
    let (service, _) = service_with(StorageConfiguration::new("acct", "c1").with_sas_key("?sv=abc"));
    assert_eq!(
        service.get_service_url(&OperationOptions::new()).unwrap(),
        "https://acct.blob.core.windows.net/?sv=abc"
    );
}

#[tokio::test]
async fn test_custom_service_url_provider() {
    let provider: ServiceUrlProvider = Arc::new(|account, sas, _| {
        format!("http://127.0.0.1:10000/{}?{}", account, sas.unwrap_or_default())
    });
    let (service, _) = service_with(sas_config());
    let service = service.with_service_url_provider(provider);
    assert_eq!(
        service.get_service_url(&OperationOptions::new()).unwrap(),
        "http://127.0.0.1:10000/acct?sv=abc"
    );
}

#[tokio::test]
async fn test_streamed_upload_fits_in_one_chunk() {
    let (service, factory) = service_with(sas_config());
    let data = vec![1u8; 1024];
    let request = UploadRequest::from_reader("small.bin", std::io::Cursor::new(data.clone()), 1024);

    service.upload(request, &OperationOptions::new()).await.unwrap();

    let ops = factory.store().operations().await;
    assert!(ops.iter().any(|op| matches!(op, Operation::PutBlob { size: 1024, .. })));
    assert!(!ops.iter().any(|op| matches!(op, Operation::PutBlock { .. })));
    assert_eq!(&factory.store().blob("c1", "small.bin").await.unwrap().data[..], &data[..]);
}

#[tokio::test]
async fn test_streamed_upload_uses_blocks() {
    let (service, factory) = service_with(sas_config());
    let size = CHUNK_SIZE * 2 + 17;
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let request = UploadRequest::from_reader("big.bin", std::io::Cursor::new(data.clone()), size as u64)
        .with_content_type("video/mp4");

    service.upload(request, &OperationOptions::new()).await.unwrap();

    let ops = factory.store().operations().await;
    let blocks = ops
        .iter()
        .filter(|op| matches!(op, Operation::PutBlock { .. }))
        .count();
    assert_eq!(blocks, 3);
    assert!(ops.iter().any(|op| matches!(op, Operation::CommitBlocks { block_count: 3, .. })));

    let stored = factory.store().blob("c1", "big.bin").await.unwrap();
    assert_eq!(stored.data.len(), size);
    assert_eq!(&stored.data[..], &data[..]);
    assert_eq!(stored.content_type, "video/mp4");
}

#[tokio::test]
async fn test_streamed_upload_of_exactly_one_chunk() {
    let (service, factory) = service_with(sas_config());
    let data = vec![9u8; CHUNK_SIZE];
    let request =
        UploadRequest::from_reader("exact.bin", std::io::Cursor::new(data), CHUNK_SIZE as u64);

    service.upload(request, &OperationOptions::new()).await.unwrap();

    let ops = factory.store().operations().await;
    assert!(ops.iter().any(|op| matches!(op, Operation::PutBlob { .. })));
    assert!(!ops.iter().any(|op| matches!(op, Operation::CommitBlocks { .. })));
}

#[tokio::test]
async fn test_cancelled_upload() {
    let (service, factory) = service_with(sas_config());
    let token = CancellationToken::new();
    token.cancel();

    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new().with_cancellation(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(factory.store().blob("c1", "a.txt").await.is_none());
}

#[tokio::test]
async fn test_cancel_during_upload() {
    let store = MemoryBlobStore::new();
    store.set_latency(Duration::from_millis(200)).await;
    init_logging();
    let factory = MemoryClientFactory::with_store(store.clone());
    let service = StorageService::new(sas_config(), Arc::new(factory));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new().with_cancellation(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(store.blob("c1", "a.txt").await.is_none());
}

#[tokio::test]
async fn test_timeout_covers_whole_operation() {
    let store = MemoryBlobStore::new();
    store.set_latency(Duration::from_millis(40)).await;
    init_logging();
    let service = StorageService::new(
        sas_config(),
        Arc::new(MemoryClientFactory::with_store(store)),
    );

    // list + create + put: each call alone fits, together they do not.
    let err = service
        .upload(
            UploadRequest::from_bytes("a.txt", Bytes::from_static(b"a")),
            &OperationOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
}

#[tokio::test]
async fn test_service_from_async_source() {
    init_logging();
    let source = FactorySource::new(|| async { Ok(sas_config()) });
    let factory = MemoryClientFactory::new();
    let service = StorageService::from_source(&source, Arc::new(factory))
        .await
        .unwrap();
    assert_eq!(service.configuration().account_name, "acct");
}
