//! Core types: math re-exports, Transform, Camera3D, errors, configuration and
//! the filesystem gateway.

pub use glam::{EulerRot, Mat4, Quat, Vec3, vec3};

pub mod camera;
pub mod config;
pub mod error;
pub mod fs;
pub mod transform;

pub use camera::{Camera3D, look_at};
pub use config::{BackendKind, EngineConfig, LoaderConfig};
pub use error::{EngineError, EngineResult};
pub use fs::{AssetSource, DiskAssetSource, MemoryAssetSource};
pub use transform::Transform;
