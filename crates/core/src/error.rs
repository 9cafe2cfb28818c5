use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Exif(#[from] exif::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to move store into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("input path is not a directory: {}", .0.display())]
    InputNotDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "invalid group value '{value}' for photo '{}', allowed values are: {}",
        .photo.display(),
        .allowed.join(", ")
    )]
    GroupNotAllowed {
        value: String,
        photo: PathBuf,
        allowed: Vec<String>,
    },

    #[error("group value '{0}' cannot be used as a store name")]
    InvalidGroupValue(String),

    #[error(
        "image metadata key '{key}' does not match a point field in '{}'; correct the key in the image or create a field named '{key}' in this store",
        .path.display()
    )]
    SchemaMismatch { key: String, path: PathBuf },

    #[error("invalid geometry blob: {0}")]
    InvalidGeometry(String),

    #[error("store has no feature table: {}", .0.display())]
    MissingFeatureTable(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
