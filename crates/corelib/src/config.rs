//! Engine configuration, built once at startup and passed by reference.
//!
//! Argument syntax follows the launcher flags:
//! `--gpu-backend=opengl|gl|headless|none`, `--size=WxH`, `--width=`, `--height=`,
//! `--asset-root=`, `--max-texture-size=`, `--flip-uv`.

use std::path::PathBuf;

pub const ASSET_ROOT_ENV: &str = "EMBER_ASSET_ROOT";
pub const BACKEND_ENV: &str = "EMBER_BACKEND";

/// Which renderer backend to construct at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    OpenGl,
    Headless,
}

impl BackendKind {
    /// Accepts the same spellings as `--gpu-backend=`; `None` for anything unknown.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "opengl" | "gl" | "gles" => Some(Self::OpenGl),
            "headless" | "none" | "null" => Some(Self::Headless),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenGl => "opengl",
            Self::Headless => "headless",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnvironmentConfig {
    /// Root that `res://` paths resolve against.
    pub asset_root: PathBuf,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("."),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Ember3D".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember3D".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: [f64; 4],
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}

impl ViewportConfig {
    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Debug)]
pub struct PerformanceConfig {
    /// Draw calls accepted between `begin_frame` and `end_frame`.
    pub max_draws_per_frame: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_draws_per_frame: 4096,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RendererDeviceConfig {
    pub backend: BackendKind,
    /// Largest width or height accepted for a texture upload.
    pub max_texture_dimension: u32,
    pub power_preference_high: bool,
}

impl Default for RendererDeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_texture_dimension: 8192,
            power_preference_high: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Store `1 - v` instead of `v` for texture coordinates.
    pub flip_uv_v: bool,
    pub max_vertices: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            flip_uv_v: false,
            max_vertices: u32::MAX as usize,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub environment: EnvironmentConfig,
    pub application: ApplicationConfig,
    pub window: WindowConfig,
    pub viewport: ViewportConfig,
    pub performance: PerformanceConfig,
    pub renderer_device: RendererDeviceConfig,
    pub loader: LoaderConfig,
}

impl EngineConfig {
    /// Populate from process-wide settings: environment variables first, then CLI args.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_args(std::env::args().skip(1));
        config
    }

    /// Defaults overridden by an explicit argument list (no environment lookup).
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        config.apply_args(args);
        config
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ASSET_ROOT_ENV) {
            self.environment.asset_root = PathBuf::from(root);
        }
        if let Some(value) = lookup(BACKEND_ENV) {
            match BackendKind::parse(&value) {
                Some(kind) => self.renderer_device.backend = kind,
                None => log::warn!("Unknown {BACKEND_ENV} '{value}', keeping default backend"),
            }
        }
    }

    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut width: Option<u32> = None;
        let mut height: Option<u32> = None;

        for arg in args {
            let arg = arg.as_ref();
            if let Some(val) = arg.strip_prefix("--gpu-backend=") {
                match BackendKind::parse(val) {
                    Some(kind) => self.renderer_device.backend = kind,
                    None => {
                        log::warn!("Unknown backend '{val}', falling back to default.");
                        self.renderer_device.backend = BackendKind::default();
                    }
                }
            } else if let Some(v) = arg.strip_prefix("--size=") {
                if let Some((sw, sh)) = v.split_once('x').or_else(|| v.split_once('X')) {
                    if let (Ok(pw), Ok(ph)) = (sw.parse::<u32>(), sh.parse::<u32>()) {
                        width = Some(pw);
                        height = Some(ph);
                    }
                }
            } else if let Some(v) = arg.strip_prefix("--width=") {
                if let Ok(pw) = v.parse::<u32>() {
                    width = Some(pw);
                }
            } else if let Some(v) = arg.strip_prefix("--height=") {
                if let Ok(ph) = v.parse::<u32>() {
                    height = Some(ph);
                }
            } else if let Some(v) = arg.strip_prefix("--asset-root=") {
                self.environment.asset_root = PathBuf::from(v);
            } else if let Some(v) = arg.strip_prefix("--max-texture-size=") {
                match v.parse::<u32>() {
                    Ok(size) if size > 0 => self.renderer_device.max_texture_dimension = size,
                    _ => log::warn!("Ignoring invalid --max-texture-size '{v}'"),
                }
            } else if arg == "--flip-uv" {
                self.loader.flip_uv_v = true;
            }
        }

        if let Some(w) = width {
            self.window.width = w.max(1);
            self.viewport.width = w.max(1);
        }
        if let Some(h) = height {
            self.window.height = h.max(1);
            self.viewport.height = h.max(1);
        }
    }
}
