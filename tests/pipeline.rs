//! End-to-end tensor pipeline through the public API

mod common;

use common::ConstantMaskFactory;
use image::{DynamicImage, Rgba, RgbaImage};
use imgly_bgremove_pipeline::{
    BackgroundRemovalProcessor, BgRemovalError, Compositor, HttpTransport, MaskCodec,
    ModelAcquirer, ModelDownloader, ModelRepository, RemovalConfig, SegmentationMask,
    SingleFlight, TensorCodec, ZipExtractor,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn processor(temp_dir: &TempDir, mask_value: f32) -> BackgroundRemovalProcessor {
    let model = temp_dir.path().join("custom.ort");
    std::fs::write(&model, b"compiled").unwrap();

    let config = RemovalConfig::builder()
        .cache_dir(temp_dir.path().join("cache"))
        .custom_model_path(&model)
        .input_size(32)
        .build()
        .unwrap();

    // Never contacted: the custom model is already compiled
    let downloader = ModelDownloader::new(
        Arc::new(HttpTransport::new(Duration::from_secs(1)).unwrap()),
        Arc::new(ZipExtractor),
        ModelRepository::default(),
    );
    let acquirer = ModelAcquirer::new(downloader, Arc::new(common::CountingCompiler::default()))
        .with_single_flight(SingleFlight::new());

    BackgroundRemovalProcessor::with_components(
        config,
        acquirer,
        Box::new(ConstantMaskFactory { value: mask_value }),
    )
    .unwrap()
}

fn checkerboard(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([250, 10, 10, 255])
        } else {
            Rgba([10, 10, 250, 40])
        }
    }))
}

#[test]
fn test_encode_is_deterministic_and_fixed_size() {
    let codec = TensorCodec::new(64);
    let image = checkerboard(123, 45);

    let first = codec.encode(&image).unwrap();
    let second = codec.encode(&image).unwrap();

    assert_eq!(first.dim(), (1, 3, 64, 64));
    assert!(first
        .iter()
        .zip(second.iter())
        .all(|(a, b)| a.to_bits() == b.to_bits()));
}

#[test]
fn test_encode_rejects_empty_image() {
    let codec = TensorCodec::new(64);
    let empty = DynamicImage::new_rgba8(0, 0);
    assert!(matches!(
        codec.encode(&empty),
        Err(BgRemovalError::ImageProcessingFailed(_))
    ));
}

#[test]
fn test_mask_decode_clamps_and_resizes() {
    let raw = [0.0, 0.5, 1.7, -0.3];
    let mask = MaskCodec::decode(&raw, 2).unwrap();
    assert_eq!(mask.data, vec![0, 128, 255, 0]);

    let resized = MaskCodec::resize(&mask, 10, 7).unwrap();
    assert_eq!(resized.dimensions, (10, 7));
    assert_eq!(resized.data.len(), 70);
}

#[test]
fn test_compositor_only_touches_alpha() {
    let image = checkerboard(4, 3);
    let mask = SegmentationMask::new(vec![77; 12], (4, 3)).unwrap();

    let output = Compositor::apply(&mask, &image).unwrap();
    let source = image.to_rgba8();
    for (out, src) in output.pixels().zip(source.pixels()) {
        assert_eq!(out.0[..3], src.0[..3]);
        assert_eq!(out.0[3], 77);
    }
}

#[test]
fn test_compositor_rejects_size_mismatch() {
    let image = checkerboard(4, 3);
    let mask = SegmentationMask::new(vec![0; 6], (3, 2)).unwrap();
    assert!(Compositor::apply(&mask, &image).is_err());
}

#[tokio::test]
async fn test_full_pipeline_keeps_resolution_and_applies_mask() {
    let temp_dir = TempDir::new().unwrap();
    let mut processor = processor(&temp_dir, 0.0);

    let image = checkerboard(50, 20);
    let result = processor.process_image(&image).await.unwrap();

    assert_eq!(result.dimensions(), (50, 20));
    assert!(result.image.pixels().all(|p| p.0[3] == 0));
    assert!(result.mask.data.iter().all(|&v| v == 0));
    assert!(processor.is_initialized());
    assert_eq!(
        processor.model_path(),
        Some(temp_dir.path().join("custom.ort").as_path())
    );
}

#[tokio::test]
async fn test_png_bytes_round_trip_through_processor() {
    let temp_dir = TempDir::new().unwrap();
    let mut processor = processor(&temp_dir, 1.0);

    let mut encoded = Vec::new();
    checkerboard(9, 9)
        .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
        .unwrap();

    let result = processor.process_bytes(&encoded).await.unwrap();
    assert_eq!(result.dimensions(), (9, 9));
    assert!(result.image.pixels().all(|p| p.0[3] == 255));

    let png = result.to_png_bytes().unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (9, 9));
}

#[tokio::test]
async fn test_undecodable_bytes_are_invalid_image() {
    let temp_dir = TempDir::new().unwrap();
    let mut processor = processor(&temp_dir, 1.0);

    let result = processor.process_bytes(b"definitely not an image").await;
    assert!(matches!(result, Err(BgRemovalError::InvalidImage(_))));
}
