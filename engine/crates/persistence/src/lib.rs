pub mod error;
pub mod file_system;
pub mod files;
pub mod io;
pub mod table;

pub use error::PersistenceError;
pub use file_system::{FileSystem, FlushReport, TransferReceipt};
pub use files::{
    ActorArchiveFile, FileKind, OwnedFile, PropFile, PropModel, PropType, StageActorsMap,
    StageArchiveFile, StatusProfile,
};
pub use table::FileTable;
