pub mod filesystem;

pub use filesystem::{move_file, InputArchive, ARCHIVE_DIR_NAME};
