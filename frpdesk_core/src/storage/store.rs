use std::{fs, io, path::Path, path::PathBuf, sync::Arc};

use log::{debug, info, warn};

use super::errors::ConfigError;
use super::paths::AppPaths;
use super::profile::{decode, encode, validate_name, Profile};
use super::render::render;
use super::resolve::{BundledToolResolver, ToolResolver};

/// CRUD over named profiles, one `<name>.json` file each.
#[derive(Clone)]
pub struct ProfileStore {
    paths: AppPaths,
    resolver: Arc<dyn ToolResolver>,
}

impl ProfileStore {
    /// Store under the per-user config directory with the default resolver.
    pub fn new() -> Result<Self, ConfigError> {
        let paths = AppPaths::new()?;
        let resolver = BundledToolResolver::new(&paths);
        Self::open(paths, Arc::new(resolver))
    }

    pub fn open(paths: AppPaths, resolver: Arc<dyn ToolResolver>) -> Result<Self, ConfigError> {
        paths.ensure_dirs()?;
        Ok(Self { paths, resolver })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn resolver(&self) -> &Arc<dyn ToolResolver> {
        &self.resolver
    }

    fn file_for(&self, name: &str) -> PathBuf {
        self.paths.profiles_dir().join(format!("{name}.json"))
    }

    /// Names of every stored profile, in directory order.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.paths.profiles_dir())? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(stem.to_string());
            }
        }
        Ok(out)
    }

    pub fn list_sorted(&self) -> Result<Vec<String>, ConfigError> {
        let mut names = self.list()?;
        names.sort();
        Ok(names)
    }

    /// Load a profile and point it at a usable tool if its own path is
    /// empty or gone. The fix-up is not written back.
    pub fn load(&self, name: &str) -> Result<Profile, ConfigError> {
        validate_name(name).map_err(|_| ConfigError::NotFound(name.to_string()))?;
        let bytes = match fs::read(self.file_for(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut profile = decode(&bytes)?;
        if profile.name != name {
            debug!(
                "Profile file '{}' carries name '{}'; using the file name",
                name, profile.name
            );
            profile.name = name.to_string();
        }
        self.resolve_tool_path(&mut profile);
        Ok(profile)
    }

    /// Create or overwrite a profile. An empty tool path is resolved first so
    /// a saved profile always points somewhere.
    pub fn save(&self, profile: &mut Profile) -> Result<(), ConfigError> {
        profile.validate()?;
        if profile.tool_path.is_empty() {
            profile.tool_path = self.resolver.resolve().to_string_lossy().into_owned();
        }
        fs::write(self.file_for(&profile.name), encode(profile)?)?;
        info!("Saved profile '{}'", profile.name);
        Ok(())
    }

    /// Delete a profile (`Ok(true)` if removed, `Ok(false)` if it didn't exist).
    pub fn delete(&self, name: &str) -> Result<bool, ConfigError> {
        if validate_name(name).is_err() {
            return Ok(false);
        }
        match fs::remove_file(self.file_for(name)) {
            Ok(()) => {
                info!("Deleted profile '{}'", name);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The profile to select when nothing else is: the first stored one in
    /// name order, or a fresh default.
    pub fn first_or_default(&self) -> Result<Profile, ConfigError> {
        for name in self.list_sorted()? {
            match self.load(&name) {
                Ok(profile) => return Ok(profile),
                Err(e) => warn!("Skipping profile '{}': {e}", name),
            }
        }
        let mut profile = Profile::default();
        self.resolve_tool_path(&mut profile);
        Ok(profile)
    }

    /// Apply the path-resolution rule in memory.
    pub fn resolve_tool_path(&self, profile: &mut Profile) {
        if profile.tool_path.is_empty() || !Path::new(&profile.tool_path).exists() {
            let resolved = self.resolver.resolve();
            debug!(
                "Resolved tool path for '{}': {:?} -> {:?}",
                profile.name, profile.tool_path, resolved
            );
            profile.tool_path = resolved.to_string_lossy().into_owned();
        }
    }

    /// Render into a fresh scratch file for an interactive run.
    pub fn write_scratch_config(&self, profile: &Profile) -> Result<PathBuf, ConfigError> {
        validate_name(&profile.name)?;
        let dir = self.paths.scratch_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}_{}.ini", profile.name, uuid::Uuid::new_v4().simple()));
        fs::write(&path, render(profile))?;
        Ok(path)
    }

    /// Render into the stable file the background service is pointed at.
    pub fn write_service_config(&self, profile: &Profile) -> Result<PathBuf, ConfigError> {
        validate_name(&profile.name)?;
        let dir = self.paths.service_configs_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.ini", profile.name));
        fs::write(&path, render(profile))?;
        Ok(path)
    }
}
