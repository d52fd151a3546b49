//! Tensor and raster codecs

pub mod compositing;
pub mod mask;
pub mod preprocessing;

pub use compositing::Compositor;
pub use mask::MaskCodec;
pub use preprocessing::TensorCodec;
