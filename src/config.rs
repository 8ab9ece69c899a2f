use anyhow::{Context, Result};
use glam::DVec3;
use promptbuild_core::{DimensionId, RequesterPose};
use promptbuild_server::{PlannerConfig, SchedulerConfig, ServerConfig};
use promptbuild_world::{
    MaterialRegistry, VoxelWorld, WorldSet, DEFAULT_MAX_Y, DEFAULT_MIN_Y, MAX_BUILD_HEIGHT,
};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/promptbuild.toml";
const DEFAULT_MATERIALS_PATH: &str = "config/materials.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Generation service URL.
    pub endpoint: String,
    pub request_timeout_secs: u64,
    /// Blocks between the requester and the structure centre.
    pub place_distance: f64,
    /// Ticks a build is spread over, whatever its size.
    pub target_ticks: usize,
    pub tick_interval_ms: u64,
    pub max_active_jobs: Option<usize>,
    pub materials_path: PathBuf,
    pub min_y: i32,
    pub max_y: i32,
    /// Worlds loaded at startup.
    pub dimensions: Vec<DimensionId>,
    pub spawn: SpawnConfig,
}

/// Where the console requester starts.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Degrees; 0 faces +Z.
    pub heading: f64,
    pub dimension: DimensionId,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 64.0,
            z: 0.5,
            heading: 0.0,
            dimension: DimensionId::DEFAULT,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            endpoint: promptbuild_net::DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: promptbuild_net::DEFAULT_TIMEOUT.as_secs(),
            place_distance: promptbuild_server::planner::DEFAULT_PLACE_DISTANCE,
            target_ticks: promptbuild_server::planner::DEFAULT_TARGET_TICKS,
            tick_interval_ms: promptbuild_core::DEFAULT_TICK_INTERVAL_MS,
            max_active_jobs: None,
            materials_path: PathBuf::from(DEFAULT_MATERIALS_PATH),
            min_y: DEFAULT_MIN_Y,
            max_y: DEFAULT_MAX_Y,
            dimensions: vec![DimensionId::Overworld],
            spawn: SpawnConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Load the build configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<BuildConfig>(&contents) {
                Ok(cfg) => cfg.sanitized(),
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    BuildConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!(
                        "Build config not found at {}. Using defaults",
                        path.display()
                    );
                }
                BuildConfig::default()
            }
        }
    }

    fn sanitized(mut self) -> Self {
        if self.target_ticks == 0 {
            warn!("target_ticks must be at least 1; using 1");
            self.target_ticks = 1;
        }
        if self.tick_interval_ms == 0 {
            warn!("tick_interval_ms must be at least 1; using 1");
            self.tick_interval_ms = 1;
        }
        let span = i64::from(self.max_y) - i64::from(self.min_y);
        if span < 1 || span > i64::from(MAX_BUILD_HEIGHT) {
            warn!(
                min_y = self.min_y,
                max_y = self.max_y,
                max_height = MAX_BUILD_HEIGHT,
                "Build height range empty or too tall; using defaults"
            );
            self.min_y = DEFAULT_MIN_Y;
            self.max_y = DEFAULT_MAX_Y;
        }
        if self.dimensions.is_empty() {
            warn!("No dimensions configured; loading the overworld");
            self.dimensions.push(DimensionId::Overworld);
        }
        self
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            planner: PlannerConfig {
                place_distance: self.place_distance,
                target_ticks: self.target_ticks,
            },
            scheduler: SchedulerConfig {
                max_active_jobs: self.max_active_jobs,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn spawn_pose(&self) -> RequesterPose {
        RequesterPose {
            position: DVec3::new(self.spawn.x, self.spawn.y, self.spawn.z),
            heading: self.spawn.heading,
            dimension: self.spawn.dimension,
        }
    }

    /// One empty world per configured dimension.
    pub fn build_worlds(&self) -> WorldSet {
        let mut worlds = WorldSet::new();
        for &dimension in &self.dimensions {
            worlds.insert(VoxelWorld::new(dimension, self.min_y, self.max_y));
        }
        worlds
    }
}

/// Load the material registry, falling back to the built-in set.
pub fn load_material_registry(path: &Path) -> MaterialRegistry {
    match load_material_registry_strict(path) {
        Ok(registry) => {
            info!(materials = registry.len(), path = %path.display(), "Material registry loaded");
            registry
        }
        Err(err) => {
            warn!("{err:#}. Using built-in materials");
            MaterialRegistry::builtin()
        }
    }
}

/// Load the material registry, returning errors to the caller.
pub fn load_material_registry_strict(path: &Path) -> Result<MaterialRegistry> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let registry = MaterialRegistry::from_json_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if registry.is_empty() {
        anyhow::bail!("{} defines no materials", path.display());
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "promptbuild-{name}-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: BuildConfig = toml::from_str(
            r#"
            endpoint = "http://example.test/generate"
            target_ticks = 100

            [spawn]
            heading = 90.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint, "http://example.test/generate");
        assert_eq!(cfg.target_ticks, 100);
        assert_eq!(cfg.place_distance, 10.0);
        assert_eq!(cfg.tick_interval_ms, 50);
        assert_eq!(cfg.max_active_jobs, None);
        assert_eq!(cfg.spawn.heading, 90.0);
        assert_eq!(cfg.spawn.y, 64.0);
        assert_eq!(cfg.server_config().planner.target_ticks, 100);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = temp_path("bad.toml");
        fs::write(&path, "target_ticks = \"many\"").unwrap();
        let cfg = BuildConfig::load_from_path(&path);
        assert_eq!(cfg.target_ticks, 200);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_values_are_sanitized() {
        let path = temp_path("zero.toml");
        fs::write(&path, "target_ticks = 0\ntick_interval_ms = 0\ndimensions = []").unwrap();
        let cfg = BuildConfig::load_from_path(&path);
        assert_eq!(cfg.target_ticks, 1);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
        assert_eq!(cfg.dimensions, vec![DimensionId::Overworld]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn oversized_height_range_falls_back_to_defaults() {
        let path = temp_path("tall.toml");
        fs::write(&path, "min_y = -2147483648\nmax_y = 2147483647").unwrap();
        let cfg = BuildConfig::load_from_path(&path);
        assert_eq!((cfg.min_y, cfg.max_y), (DEFAULT_MIN_Y, DEFAULT_MAX_Y));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn shipped_materials_file_parses() {
        let registry =
            load_material_registry_strict(Path::new(DEFAULT_MATERIALS_PATH)).expect("materials");
        assert!(registry.parse("oak_stairs[facing=north,half=bottom]").is_ok());
        assert!(registry.parse("stone").is_ok());
    }

    #[test]
    fn shipped_config_parses() {
        let contents = fs::read_to_string(DEFAULT_CONFIG_PATH).expect("config file");
        let cfg: BuildConfig = toml::from_str(&contents).expect("valid toml");
        assert_eq!(cfg.target_ticks, 200);
        assert_eq!(cfg.place_distance, 10.0);
    }

    #[test]
    fn missing_materials_file_uses_builtin() {
        let registry = load_material_registry(Path::new("does/not/exist.json"));
        assert_eq!(registry.len(), MaterialRegistry::builtin().len());
    }
}
