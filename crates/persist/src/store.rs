use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tilemud_common::{CharacterId, WorldMeta};
use tilemud_kernel::WorldError;

const META_FILE: &str = "meta.json";
const PERSISTENT_FILE: &str = "persistent.json";
const COMMANDS_DIR: &str = "commands";

/// Errors from the data directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("world error: {0}")]
    World(#[from] WorldError),
    #[error("tiles are created with their map and cannot be restored")]
    TileNotRestorable,
    #[error("no tile at {x},{y},{z} on the target map")]
    MissingTile { x: i32, y: i32, z: i32 },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Counters that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Persistent {
    #[serde(alias = "characterID")]
    pub character_id: u64,
}

/// A user-authored command as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCommandDef {
    /// File stem the command was loaded from.
    #[serde(skip)]
    pub name: String,
    /// Regular expression source, matched case-insensitively.
    #[serde(alias = "regex")]
    pub pattern: String,
    /// Script source run when the pattern matches.
    #[serde(alias = "fun")]
    pub body: String,
}

/// Everything loaded from a world's data directory.
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
    meta: WorldMeta,
    persistent: Persistent,
    commands: Vec<UserCommandDef>,
}

impl Database {
    /// Load the data directory at `root`, creating it if missing.
    ///
    /// Missing `meta.json`/`persistent.json` fall back to defaults. User
    /// commands load in file-name order.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(io_error(&root))?;
        tracing::info!(target: "tilemud::boot", root = %root.display(), "loading database files");

        let meta = read_optional(&root.join(META_FILE))?.unwrap_or_default();
        let persistent = read_optional(&root.join(PERSISTENT_FILE))?.unwrap_or_default();
        let commands = load_user_commands(&root.join(COMMANDS_DIR))?;

        Ok(Self {
            root,
            meta,
            persistent,
            commands,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &WorldMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut WorldMeta {
        &mut self.meta
    }

    pub fn persistent(&self) -> &Persistent {
        &self.persistent
    }

    pub fn user_commands(&self) -> &[UserCommandDef] {
        &self.commands
    }

    /// Allocate a character id and persist the advanced counter.
    ///
    /// A failed save is logged; the in-memory counter still advances so an
    /// id is never handed out twice within one run.
    pub fn next_character_id(&mut self) -> CharacterId {
        let id = CharacterId(self.persistent.character_id);
        self.persistent.character_id += 1;
        if let Err(e) = self.save_persistent() {
            tracing::error!("failed to save persistent data: {e}");
        }
        id
    }

    /// Save metadata and counters.
    pub fn save(&self) -> Result<(), StoreError> {
        self.save_meta()?;
        self.save_persistent()
    }

    pub fn save_meta(&self) -> Result<(), StoreError> {
        write_atomic(&self.root.join(META_FILE), &self.meta)
    }

    pub fn save_persistent(&self) -> Result<(), StoreError> {
        write_atomic(&self.root.join(PERSISTENT_FILE), &self.persistent)
    }
}

fn read_optional<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    let value = serde_json::from_str(&text).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(target: "tilemud::boot", file = %path.display(), "loaded");
    Ok(Some(value))
}

fn load_user_commands(dir: &Path) -> Result<Vec<UserCommandDef>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_error(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut commands = Vec::with_capacity(files.len());
    for path in files {
        match read_optional::<UserCommandDef>(&path) {
            Ok(Some(mut def)) => {
                def.name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                commands.push(def);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("failed to load user command: {e}"),
        }
    }
    Ok(commands)
}

/// Serialize `value` as pretty JSON into a temporary file beside `path`,
/// then rename it over `path`. On any failure `path` keeps its old bytes
/// and the temporary file is removed.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    staged.write_all(&json).map_err(io_error(path))?;
    staged.flush().map_err(io_error(path))?;
    staged
        .persist(path)
        .map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}
