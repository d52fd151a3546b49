//! Model acquisition over real HTTP against a loopback stub

mod common;

use common::{package_archive, CountingCompiler, HttpStub, RecordingReporter, MANIFEST_JSON};
use imgly_bgremove_pipeline::{
    clear_cache, ArtifactState, ArtifactTransport, BgRemovalError, CacheLocationResolver,
    CacheRoot, ClearOutcome, HttpTransport, ModelAcquirer, ModelDownloader, ModelVariant,
    NoOpProgressReporter, SingleFlight, ZipExtractor,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn acquirer(stub: &HttpStub, compiler: Arc<CountingCompiler>) -> ModelAcquirer {
    let transport = HttpTransport::new(Duration::from_secs(10)).unwrap();
    let downloader = ModelDownloader::new(
        Arc::new(transport),
        Arc::new(ZipExtractor),
        stub.repository(),
    );
    ModelAcquirer::new(downloader, compiler).with_single_flight(SingleFlight::new())
}

#[tokio::test]
async fn test_first_run_downloads_and_compiles_then_reuses() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    let archive_url = repository.archive_url(ModelVariant::Quantized);
    stub.serve(&archive_url, package_archive(ModelVariant::Quantized));

    let temp_dir = TempDir::new().unwrap();
    let cache = CacheRoot::create(temp_dir.path().join("cache")).unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let acquirer = acquirer(&stub, Arc::clone(&compiler));

    let reporter = RecordingReporter::default();
    let path = acquirer
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &reporter)
        .await
        .unwrap();

    assert_eq!(path, cache.compiled_path(ModelVariant::Quantized));
    assert_eq!(std::fs::read(&path).unwrap(), b"compiled:graph");
    assert_eq!(
        cache.artifact_state(ModelVariant::Quantized),
        ArtifactState::CompiledPresent
    );
    assert_eq!(compiler.calls(), 1);
    assert_eq!(stub.hit_count(&archive_url), 1);

    let fractions = reporter.fractions();
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));

    // Second run: exactly one report, no network, no compiler
    let reporter = RecordingReporter::default();
    let again = acquirer
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &reporter)
        .await
        .unwrap();

    assert_eq!(again, path);
    assert_eq!(reporter.fractions(), vec![1.0]);
    assert_eq!(compiler.calls(), 1);
    assert_eq!(stub.hits().len(), 1);
}

#[tokio::test]
async fn test_missing_archive_falls_back_to_individual_files() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    let variant = ModelVariant::FullPrecision;
    stub.serve(
        &repository.package_file_url(variant, "Manifest.json"),
        MANIFEST_JSON.as_bytes().to_vec(),
    );
    stub.serve(
        &repository.package_file_url(variant, "Data/model.onnx"),
        b"fp32 graph".to_vec(),
    );
    // Optional weights file is left unserved (404)

    let temp_dir = TempDir::new().unwrap();
    let cache = CacheRoot::create(temp_dir.path()).unwrap();
    let compiler = Arc::new(CountingCompiler::default());

    let path = acquirer(&stub, Arc::clone(&compiler))
        .ensure_compiled_model(variant, &cache, None, &NoOpProgressReporter)
        .await
        .unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"compiled:fp32 graph");
    assert_eq!(
        stub.hit_count(&repository.archive_url(variant)),
        1,
        "archive is tried first"
    );
    let package = cache.package_path(variant);
    assert!(package.join("Manifest.json").is_file());
    assert!(package.join("Data/model.onnx").is_file());
    assert!(!package.join("Data/weights/weight.bin").exists());
}

#[tokio::test]
async fn test_server_error_is_download_failure() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    stub.respond(
        &repository.archive_url(ModelVariant::Quantized),
        503,
        Vec::new(),
    );

    let temp_dir = TempDir::new().unwrap();
    let cache = CacheRoot::create(temp_dir.path()).unwrap();
    let compiler = Arc::new(CountingCompiler::default());

    let result = acquirer(&stub, Arc::clone(&compiler))
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter)
        .await;

    assert!(matches!(result, Err(BgRemovalError::ModelDownloadFailed(_))));
    assert_eq!(compiler.calls(), 0);
    assert_eq!(
        cache.artifact_state(ModelVariant::Quantized),
        ArtifactState::Missing
    );
}

#[tokio::test]
async fn test_concurrent_callers_share_one_download() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    let archive_url = repository.archive_url(ModelVariant::Quantized);
    stub.serve(&archive_url, package_archive(ModelVariant::Quantized));

    let temp_dir = TempDir::new().unwrap();
    let cache = CacheRoot::create(temp_dir.path()).unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let acquirer = acquirer(&stub, Arc::clone(&compiler));

    let (first, second) = tokio::join!(
        acquirer.ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter),
        acquirer.ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(compiler.calls(), 1);
    assert_eq!(stub.hit_count(&archive_url), 1);
}

#[tokio::test]
async fn test_clear_cache_then_reacquire() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    let archive_url = repository.archive_url(ModelVariant::Quantized);
    stub.serve(&archive_url, package_archive(ModelVariant::Quantized));

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("models");
    let compiler = Arc::new(CountingCompiler::default());
    let acquirer = acquirer(&stub, Arc::clone(&compiler));

    let cache = CacheLocationResolver::resolve(Some(&root), &repository).unwrap();
    acquirer
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter)
        .await
        .unwrap();

    assert_eq!(
        clear_cache(Some(&root), &repository).unwrap(),
        ClearOutcome::Cleared
    );
    assert!(!root.exists());
    assert_eq!(
        clear_cache(Some(&root), &repository).unwrap(),
        ClearOutcome::AlreadyEmpty
    );

    let cache = CacheLocationResolver::resolve(Some(&root), &repository).unwrap();
    acquirer
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter)
        .await
        .unwrap();
    assert_eq!(compiler.calls(), 2);
    assert_eq!(stub.hit_count(&archive_url), 2);
}

#[tokio::test]
async fn test_variants_are_cached_side_by_side() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    for variant in [ModelVariant::Quantized, ModelVariant::FullPrecision] {
        stub.serve(&repository.archive_url(variant), package_archive(variant));
    }

    let temp_dir = TempDir::new().unwrap();
    let cache = CacheRoot::create(temp_dir.path()).unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let acquirer = acquirer(&stub, Arc::clone(&compiler));

    let quantized = acquirer
        .ensure_compiled_model(ModelVariant::Quantized, &cache, None, &NoOpProgressReporter)
        .await
        .unwrap();
    let full = acquirer
        .ensure_compiled_model(ModelVariant::FullPrecision, &cache, None, &NoOpProgressReporter)
        .await
        .unwrap();

    assert_ne!(quantized, full);
    assert!(quantized.ends_with("birefnet_quantized.ort"));
    assert!(full.ends_with("birefnet_fp32.ort"));
    assert_eq!(compiler.calls(), 2);
}

#[tokio::test]
async fn test_unwritable_destination_is_cache_error() {
    let stub = HttpStub::start().await;
    let repository = stub.repository();
    let archive_url = repository.archive_url(ModelVariant::Quantized);
    stub.serve(&archive_url, package_archive(ModelVariant::Quantized));

    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"file, not a directory").unwrap();

    let transport = HttpTransport::with_client(reqwest::Client::new());
    let mut on_bytes = |_: u64, _: Option<u64>| {};
    let result = transport
        .fetch(&archive_url, &blocker.join("nested").join("archive.zip"), &mut on_bytes)
        .await;

    assert!(matches!(result, Err(BgRemovalError::CacheUnavailable(_))));
    assert!(result.unwrap_err().is_acquisition_error());
}
