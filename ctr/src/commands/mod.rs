/// Image command handlers
pub mod images;

/// Version command handlers
pub mod version;
