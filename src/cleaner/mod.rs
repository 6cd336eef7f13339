pub mod drop_files;
pub mod paths;
pub mod root_logs;
pub mod vm_logs;

pub use drop_files::DropCleaner;
pub use root_logs::RootLogCleaner;
pub use vm_logs::VmLogCleaner;
